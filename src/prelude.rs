//! Convenient re-exports for common usage patterns.
//!
//! ```ignore
//! use gir_bridge::prelude::*;
//!
//! let rt = Runtime::new(MetadataStore::from_json_str(doc)?, SymbolTable::new());
//! let value = rt.call("Demo.answer", None, &[])?;
//! ```

// Unified error handling
pub use crate::error::{Error, ExceptionKind, Result};

// Metadata
pub use crate::repository::{
    ArgInfo, BaseInfo, CallableInfo, Direction, InfoType, MetadataStore, Repository, ScopeType,
    Transfer, TypeInfo, TypeTag,
};

// Binding and invocation
pub use crate::config::{BridgeConfig, UnscopedCallbackPolicy};
pub use crate::function::{CallPlan, CallableDescriptor, DescriptorState, ParameterRole};
pub use crate::runtime::Runtime;

// Values on both sides of the boundary
pub use crate::native::{Argument, CallContext, NativeContext, NativeLibrary, SymbolTable};
pub use crate::value::{NativeObject, ScriptFunction, Value};
