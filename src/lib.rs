//! Call-descriptor derivation and value marshaling between a dynamically
//! typed scripting runtime and native libraries described by introspection
//! metadata.
//!
//! For every callable the bridge derives, once, how script arguments map to
//! native ones: which arguments the script passes, which the bridge fills in
//! (array lengths, callback user data and destroy notifiers), where the
//! implicit receiver and error cell go. Each call then lowers script values
//! to native slots, invokes the native function, lifts the outputs back and
//! releases whatever the ownership transfer leaves with the bridge.
//!
//! # Quick Start
//!
//! ```ignore
//! use gir_bridge::prelude::*;
//!
//! let store = MetadataStore::from_json_str(include_str!("Demo.json"))?;
//! let mut lib = SymbolTable::new();
//! lib.define("demo_add", |_cx, args| {
//!     let a = args.first().copied().unwrap_or_default().as_i32();
//!     let b = args.get(1).copied().unwrap_or_default().as_i32();
//!     Ok(Argument::from_i64(i64::from(a + b)))
//! });
//!
//! let rt = Runtime::new(store, lib);
//! let sum = rt.call("Demo.add", None, &[Value::from(2), Value::from(3)])?;
//! ```
//!
//! # Modules
//!
//! - [`repository`] - Metadata query trait and the JSON-backed store
//! - [`types`] - Classification of type occurrences into descriptors
//! - [`marshal`] - Script/native value conversion, ownership release, callbacks
//! - [`function`] - Call plans and callable descriptors
//! - [`native`] - Simulated native memory and the invoker interface
//! - [`runtime`] - Binding callables against a native library
//!
//! # Feature Flags
//!
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `cli` - Enable the command-line interface binary
//! - `full` - Enable all features

pub mod config;
mod error;
pub mod function;
mod logging;
pub mod marshal;
pub mod native;
pub mod prelude;
pub mod repository;
pub mod runtime;
pub mod types;
pub mod value;

// Re-export the unified error type
pub use error::{Error, ExceptionKind, Result};

pub use config::{BridgeConfig, ConfigError, UnscopedCallbackPolicy};
pub use function::{CallPlan, CallableDescriptor, DescriptorState, Parameter, ParameterRole, PlanError};
pub use marshal::{MarshalError, Marshaler};
pub use native::{Argument, CallContext, HeapError, NativeContext, NativeFunction, NativeLibrary, SymbolTable};
pub use repository::{MetadataStore, Repository};
pub use runtime::Runtime;
pub use types::{ArrayLength, Category, TypeDescriptor, TypeError};
pub use value::{NativeObject, ScriptFunction, Value};
