//! Errors raised by the simulated native address space.

use thiserror::Error;

/// Faults when touching native memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("Invalid native pointer {ptr:#x} (length {len}, heap size {heap_size})")]
    InvalidPointer {
        ptr: u64,
        len: usize,
        heap_size: usize,
    },

    #[error("Double free of {0:#x}")]
    DoubleFree(u64),

    #[error("Free of {0:#x}, which was never allocated")]
    NotAllocated(u64),

    #[error("Invalid UTF-8 in native string at {0:#x}")]
    InvalidUtf8(u64),

    #[error("Unterminated native string at {0:#x}")]
    Unterminated(u64),
}
