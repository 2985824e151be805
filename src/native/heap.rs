//! Simulated native address space.

use std::collections::{BTreeMap, BTreeSet};

use super::buffer::{align_to, find_nul, read_slice, write_slice};
use super::{Argument, HeapError};

/// Addresses below this are never handed out, so `0` is always NULL and
/// small integers are never valid pointers.
const NULL_GUARD: usize = 16;

/// Size of a `GError` block: domain (u32), code (i32), message pointer.
pub const GERROR_SIZE: usize = 16;

/// A native error record read out of a `GError` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub domain: u32,
    pub code: i32,
    pub message: String,
}

/// Bump allocator standing in for the native heap.
///
/// Every block is tracked until freed, which is what lets tests assert that
/// a call neither leaks nor double frees. Addresses are never reused.
#[derive(Debug, Clone)]
pub struct NativeHeap {
    data: Vec<u8>,
    blocks: BTreeMap<u64, usize>,
    freed: BTreeSet<u64>,
}

impl Default for NativeHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeHeap {
    pub fn new() -> Self {
        Self {
            data: vec![0; NULL_GUARD],
            blocks: BTreeMap::new(),
            freed: BTreeSet::new(),
        }
    }

    /// Allocate a zeroed block. Zero-sized requests still get a unique address.
    pub fn alloc(&mut self, size: usize, align: usize) -> u64 {
        let offset = align_to(self.data.len(), align);
        let size = size.max(1);
        self.data.resize(offset + size, 0);
        let ptr = offset as u64;
        self.blocks.insert(ptr, size);
        ptr
    }

    /// Allocate a block holding a copy of `bytes`.
    pub fn alloc_bytes(&mut self, bytes: &[u8], align: usize) -> Result<u64, HeapError> {
        let ptr = self.alloc(bytes.len(), align);
        self.write(ptr, bytes)?;
        Ok(ptr)
    }

    /// Release a block. Freeing NULL is a no-op.
    pub fn free(&mut self, ptr: u64) -> Result<(), HeapError> {
        if ptr == 0 {
            return Ok(());
        }
        if self.blocks.remove(&ptr).is_some() {
            self.freed.insert(ptr);
            Ok(())
        } else if self.freed.contains(&ptr) {
            Err(HeapError::DoubleFree(ptr))
        } else {
            Err(HeapError::NotAllocated(ptr))
        }
    }

    fn check(&self, ptr: u64, len: usize) -> Result<(), HeapError> {
        if ptr < NULL_GUARD as u64 {
            return Err(HeapError::InvalidPointer {
                ptr,
                len,
                heap_size: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn read(&self, ptr: u64, len: usize) -> Result<&[u8], HeapError> {
        self.check(ptr, len)?;
        read_slice(&self.data, ptr, len)
    }

    pub fn write(&mut self, ptr: u64, bytes: &[u8]) -> Result<(), HeapError> {
        self.check(ptr, bytes.len())?;
        write_slice(&mut self.data, ptr, bytes)
    }

    /// Load a `size`-byte value, zero extended.
    pub fn load(&self, ptr: u64, size: usize) -> Result<Argument, HeapError> {
        Ok(Argument::from_le_bytes(self.read(ptr, size)?))
    }

    /// Store the low `size` bytes of a value.
    pub fn store(&mut self, ptr: u64, size: usize, value: Argument) -> Result<(), HeapError> {
        self.write(ptr, &value.to_le_bytes(size))
    }

    pub fn load_ptr(&self, ptr: u64) -> Result<u64, HeapError> {
        Ok(self.load(ptr, 8)?.as_ptr())
    }

    pub fn store_ptr(&mut self, ptr: u64, value: u64) -> Result<(), HeapError> {
        self.store(ptr, 8, Argument::from_ptr(value))
    }

    /// Copy a string into a fresh NUL-terminated block.
    pub fn strdup(&mut self, s: &str) -> Result<u64, HeapError> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        self.alloc_bytes(&bytes, 1)
    }

    /// Read a NUL-terminated UTF-8 string.
    pub fn read_cstr(&self, ptr: u64) -> Result<String, HeapError> {
        self.check(ptr, 1)?;
        let len = find_nul(&self.data, ptr)?;
        let bytes = read_slice(&self.data, ptr, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| HeapError::InvalidUtf8(ptr))
    }

    /// Duplicate `size` bytes at `ptr` into a new block.
    pub fn copy_block(&mut self, ptr: u64, size: usize) -> Result<u64, HeapError> {
        let bytes = self.read(ptr, size)?.to_vec();
        self.alloc_bytes(&bytes, 8)
    }

    /// Allocate a `GError` carrying a copy of `message`.
    pub fn new_error(&mut self, domain: u32, code: i32, message: &str) -> Result<u64, HeapError> {
        let msg = self.strdup(message)?;
        let ptr = self.alloc(GERROR_SIZE, 8);
        self.store(ptr, 4, Argument::from_u64(u64::from(domain)))?;
        self.store(ptr + 4, 4, Argument::from_i64(i64::from(code)))?;
        self.store_ptr(ptr + 8, msg)?;
        Ok(ptr)
    }

    pub fn read_error(&self, ptr: u64) -> Result<NativeError, HeapError> {
        let domain = self.load(ptr, 4)?.as_u32();
        let code = self.load(ptr + 4, 4)?.as_i32();
        let msg = self.load_ptr(ptr + 8)?;
        let message = if msg == 0 {
            String::new()
        } else {
            self.read_cstr(msg)?
        };
        Ok(NativeError {
            domain,
            code,
            message,
        })
    }

    /// Free a `GError` and its message.
    pub fn free_error(&mut self, ptr: u64) -> Result<(), HeapError> {
        if ptr == 0 {
            return Ok(());
        }
        let msg = self.load_ptr(ptr + 8)?;
        self.free(msg)?;
        self.free(ptr)
    }

    /// Number of blocks allocated and not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_live(&self, ptr: u64) -> bool {
        self.blocks.contains_key(&ptr)
    }

    pub fn block_size(&self, ptr: u64) -> Option<usize> {
        self.blocks.get(&ptr).copied()
    }

    /// Total bytes of address space handed out so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
