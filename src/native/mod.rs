//! The native side of the boundary.
//!
//! Native memory is modelled as a tracked address space ([`NativeHeap`]) so
//! ownership mistakes show up as leaks or double frees instead of corruption.
//! Native functions are looked up through a [`NativeLibrary`] and called with
//! untyped [`Argument`] slots.

mod argument;
mod buffer;
mod context;
mod error;
mod heap;
mod library;

pub use argument::Argument;
pub use buffer::align_to;
pub use context::NativeContext;
pub use error::HeapError;
pub use heap::{GERROR_SIZE, NativeError, NativeHeap};
pub use library::{CallContext, NativeFunction, NativeLibrary, SymbolTable};

/// Node layouts of `GSList` (data, next) and `GList` (data, next, prev).
pub const SLIST_NODE_SIZE: usize = 16;
pub const LIST_NODE_SIZE: usize = 24;
pub const NODE_NEXT: u64 = 8;
pub const NODE_PREV: u64 = 16;
