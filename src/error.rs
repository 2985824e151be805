//! Unified error type for the bridge.
//!
//! Every script-visible failure is an [`Error`]. The embedding runtime raises
//! it as a script exception of the class given by [`Error::kind`], with the
//! `Display` text as the message.

use thiserror::Error;

use crate::config::ConfigError;
use crate::function::PlanError;
use crate::marshal::MarshalError;
use crate::native::HeapError;

/// Unified error type for all bridge operations.
///
/// ```ignore
/// use gir_bridge::{Result, Runtime, Value};
///
/// fn add(rt: &Runtime) -> Result<Value> {
///     rt.call("Demo.add", None, &[Value::from(1), Value::from(2)])
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Fewer script arguments than logical inputs.
    #[error("Not enough arguments; expected {expected}, have {actual}")]
    Arity { expected: usize, actual: usize },

    /// A script argument cannot be converted to its parameter type.
    #[error("Expected argument of type {expected} for parameter {parameter}, got '{got}'")]
    TypeMismatch {
        parameter: String,
        expected: String,
        got: String,
    },

    /// The callable could not be prepared. Cached by the descriptor.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The native call populated its error channel.
    #[error("{message}")]
    NativeInvocation {
        domain: u32,
        code: i32,
        message: String,
    },

    #[error("Method {callable} called without a receiver")]
    MissingReceiver { callable: String },

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// Native code touched memory it does not own.
    #[error("Native memory fault: {0}")]
    Heap(#[from] HeapError),

    /// Raised by a script function.
    #[error("{0}")]
    Script(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Script exception class an [`Error`] is raised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    TypeError,
    Error,
}

impl Error {
    /// Create an error as thrown by script code.
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Exception class used when raising this error into the script.
    pub fn kind(&self) -> ExceptionKind {
        match self {
            Self::Arity { .. } | Self::TypeMismatch { .. } | Self::MissingReceiver { .. } => {
                ExceptionKind::TypeError
            }
            Self::Plan(PlanError::UnsupportedCallableShape { .. }) => ExceptionKind::TypeError,
            Self::Marshal(MarshalError::TypeMismatch { .. } | MarshalError::FixedSizeMismatch { .. }) => {
                ExceptionKind::TypeError
            }
            _ => ExceptionKind::Error,
        }
    }

    /// Metadata describes something the bridge cannot handle at all. These
    /// point at broken bindings rather than bad script input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Plan(PlanError::Type { .. }) | Self::Marshal(MarshalError::Type(_))
        )
    }

    /// Returns `true` for argument validation failures, which never reach
    /// native code.
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Self::Arity { .. } | Self::TypeMismatch { .. })
    }

    /// Returns `true` if the native error channel was populated.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::NativeInvocation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = Error::Arity {
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "Not enough arguments; expected 2, have 1");
        assert_eq!(err.kind(), ExceptionKind::TypeError);

        let err = Error::TypeMismatch {
            parameter: "name".to_string(),
            expected: "String".to_string(),
            got: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Expected argument of type String for parameter name, got '42'"
        );
        assert!(err.is_argument_error());
    }

    #[test]
    fn test_native_error_carries_message() {
        let err = Error::NativeInvocation {
            domain: 1,
            code: 4,
            message: "File not found".to_string(),
        };
        assert_eq!(err.to_string(), "File not found");
        assert_eq!(err.kind(), ExceptionKind::Error);
        assert!(err.is_native());
        assert!(!err.is_fatal());
    }
}
