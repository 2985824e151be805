//! Error types for value conversion.

use thiserror::Error;

use crate::function::PlanError;
use crate::native::HeapError;
use crate::types::TypeError;

/// Errors that can occur while converting values across the boundary.
#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("Expected {expected}, got '{got}'")]
    TypeMismatch { expected: String, got: String },

    #[error("Expected an array of length {expected}, got {got}")]
    FixedSizeMismatch { expected: usize, got: usize },

    #[error("Length required to convert {0}")]
    LengthRequired(String),

    #[error("Unsupported conversion: {0}")]
    Unsupported(String),

    #[error("Invalid unichar value: {0:#x}")]
    InvalidChar(u32),

    #[error("Element {index} of the buffer at {base:#x} is out of the address space")]
    AddressOverflow { base: u64, index: usize },

    #[error("No callback registered at {0:#x}")]
    UnknownTrampoline(u64),

    /// The callback type's own signature cannot be bridged.
    #[error("Invalid callback signature: {0}")]
    Signature(#[from] PlanError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Heap(#[from] HeapError),
}
