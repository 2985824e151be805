//! Per-runtime native state.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::{Argument, HeapError, NativeHeap};
use crate::config::UnscopedCallbackPolicy;
use crate::error::Error;
use crate::logging::{trace, warn};
use crate::marshal::TrampolineTable;
use crate::value::NativeObject;

/// Native heap, trampolines, live wrappers and the pending script exception.
///
/// Every accessor borrows for the duration of one statement only. Native
/// code may call back into the script, which may call native code again, so
/// no borrow is ever held across a call.
#[derive(Debug, Default)]
pub struct NativeContext {
    heap: RefCell<NativeHeap>,
    trampolines: RefCell<TrampolineTable>,
    wrappers: RefCell<HashMap<u64, Weak<NativeObject>>>,
    pending: RefCell<Option<Error>>,
    unscoped: UnscopedCallbackPolicy,
}

impl NativeContext {
    pub fn new(unscoped: UnscopedCallbackPolicy) -> Self {
        Self {
            unscoped,
            ..Self::default()
        }
    }

    pub fn unscoped_policy(&self) -> UnscopedCallbackPolicy {
        self.unscoped
    }

    pub fn heap(&self) -> Ref<'_, NativeHeap> {
        self.heap.borrow()
    }

    pub fn heap_mut(&self) -> RefMut<'_, NativeHeap> {
        self.heap.borrow_mut()
    }

    pub fn alloc(&self, size: usize, align: usize) -> u64 {
        self.heap.borrow_mut().alloc(size, align)
    }

    pub fn free(&self, ptr: u64) -> Result<(), HeapError> {
        self.heap.borrow_mut().free(ptr)
    }

    pub fn load(&self, ptr: u64, size: usize) -> Result<Argument, HeapError> {
        self.heap.borrow().load(ptr, size)
    }

    pub fn store(&self, ptr: u64, size: usize, value: Argument) -> Result<(), HeapError> {
        self.heap.borrow_mut().store(ptr, size, value)
    }

    pub fn load_ptr(&self, ptr: u64) -> Result<u64, HeapError> {
        self.heap.borrow().load_ptr(ptr)
    }

    pub fn store_ptr(&self, ptr: u64, value: u64) -> Result<(), HeapError> {
        self.heap.borrow_mut().store_ptr(ptr, value)
    }

    pub fn strdup(&self, s: &str) -> Result<u64, HeapError> {
        self.heap.borrow_mut().strdup(s)
    }

    pub fn read_cstr(&self, ptr: u64) -> Result<String, HeapError> {
        self.heap.borrow().read_cstr(ptr)
    }

    pub fn copy_block(&self, ptr: u64, size: usize) -> Result<u64, HeapError> {
        self.heap.borrow_mut().copy_block(ptr, size)
    }

    pub fn live_allocations(&self) -> usize {
        self.heap.borrow().live_allocations()
    }

    pub fn is_live(&self, ptr: u64) -> bool {
        self.heap.borrow().is_live(ptr)
    }

    pub(crate) fn trampolines(&self) -> Ref<'_, TrampolineTable> {
        self.trampolines.borrow()
    }

    pub(crate) fn trampolines_mut(&self) -> RefMut<'_, TrampolineTable> {
        self.trampolines.borrow_mut()
    }

    /// Number of trampolines still registered.
    pub fn live_trampolines(&self) -> usize {
        self.trampolines.borrow().len()
    }

    /// The live wrapper already backed by `ptr`, if any.
    pub fn cached_wrapper(&self, ptr: u64) -> Option<Rc<NativeObject>> {
        let mut wrappers = self.wrappers.borrow_mut();
        match wrappers.get(&ptr).map(Weak::upgrade) {
            Some(Some(obj)) => Some(obj),
            Some(None) => {
                wrappers.remove(&ptr);
                None
            }
            None => None,
        }
    }

    /// Wrap `ptr`, reusing the live wrapper for it if there is one.
    pub fn wrap(&self, ptr: u64, type_name: &str, owned: bool) -> Rc<NativeObject> {
        if let Some(obj) = self.cached_wrapper(ptr) {
            trace!(ptr, type_name, "reusing wrapper");
            return obj;
        }
        let obj = Rc::new(NativeObject::new(ptr, type_name, owned));
        self.wrappers.borrow_mut().insert(ptr, Rc::downgrade(&obj));
        obj
    }

    /// Release the memory held by an owned wrapper. The wrapper stays usable
    /// as a value but no longer owns its pointer.
    pub fn release_object(&self, obj: &NativeObject) -> Result<(), HeapError> {
        self.wrappers.borrow_mut().remove(&obj.ptr());
        if obj.disown() {
            self.free(obj.ptr())?;
        }
        Ok(())
    }

    /// Record a script exception raised while native code was running. The
    /// first one wins; it is rethrown once the native call returns.
    pub fn raise_pending(&self, err: Error) {
        let mut pending = self.pending.borrow_mut();
        if pending.is_some() {
            warn!(error = %err, "dropping script exception, one is already pending");
            return;
        }
        *pending = Some(err);
    }

    pub fn take_pending(&self) -> Option<Error> {
        self.pending.borrow_mut().take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }
}
