//! The native invoker: functions callable with a list of typed slots.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::{Argument, HeapError, NativeContext, NativeError};
use crate::logging::{debug, warn};
use crate::marshal::call_trampoline;
use crate::repository::Repository;

/// A native function. Receives the receiver (for methods), the declared
/// arguments and the error cell (for throwing functions) as raw slots.
pub trait NativeFunction {
    fn call(&self, cx: &CallContext<'_>, args: &[Argument]) -> Result<Argument, HeapError>;
}

impl<F> NativeFunction for F
where
    F: Fn(&CallContext<'_>, &[Argument]) -> Result<Argument, HeapError>,
{
    fn call(&self, cx: &CallContext<'_>, args: &[Argument]) -> Result<Argument, HeapError> {
        self(cx, args)
    }
}

/// Symbol resolution, the analogue of `dlsym`.
pub trait NativeLibrary {
    fn resolve(&self, symbol: &str) -> Option<Rc<dyn NativeFunction>>;
}

/// A library backed by a symbol table.
#[derive(Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, Rc<dyn NativeFunction>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `symbol` as a closure.
    pub fn define<F>(&mut self, symbol: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&CallContext<'_>, &[Argument]) -> Result<Argument, HeapError> + 'static,
    {
        self.symbols.insert(symbol.into(), Rc::new(f));
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, function: Rc<dyn NativeFunction>) {
        self.symbols.insert(symbol.into(), function);
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.symbols.keys().collect();
        names.sort();
        f.debug_struct("SymbolTable").field("symbols", &names).finish()
    }
}

impl NativeLibrary for SymbolTable {
    fn resolve(&self, symbol: &str) -> Option<Rc<dyn NativeFunction>> {
        self.symbols.get(symbol).cloned()
    }
}

/// What a native function sees of the process while it runs.
pub struct CallContext<'a> {
    pub(crate) repo: &'a dyn Repository,
    pub(crate) native: &'a NativeContext,
}

impl<'a> CallContext<'a> {
    pub fn new(repo: &'a dyn Repository, native: &'a NativeContext) -> Self {
        Self { repo, native }
    }

    pub fn native(&self) -> &NativeContext {
        self.native
    }

    pub fn alloc(&self, size: usize) -> u64 {
        self.native.alloc(size, 8)
    }

    pub fn free(&self, ptr: u64) -> Result<(), HeapError> {
        self.native.free(ptr)
    }

    pub fn strdup(&self, s: &str) -> Result<u64, HeapError> {
        self.native.strdup(s)
    }

    pub fn read_cstr(&self, ptr: u64) -> Result<String, HeapError> {
        self.native.read_cstr(ptr)
    }

    pub fn load(&self, ptr: u64, size: usize) -> Result<Argument, HeapError> {
        self.native.load(ptr, size)
    }

    pub fn store(&self, ptr: u64, size: usize, value: Argument) -> Result<(), HeapError> {
        self.native.store(ptr, size, value)
    }

    pub fn load_ptr(&self, ptr: u64) -> Result<u64, HeapError> {
        self.native.load_ptr(ptr)
    }

    pub fn store_ptr(&self, ptr: u64, value: u64) -> Result<(), HeapError> {
        self.native.store_ptr(ptr, value)
    }

    /// Populate a `GError **` out cell, as `g_set_error` does. A NULL cell
    /// means the caller ignores errors.
    pub fn set_error(&self, cell: Argument, domain: u32, code: i32, message: &str) -> Result<(), HeapError> {
        if cell.is_null() {
            return Ok(());
        }
        let err = self.native.heap_mut().new_error(domain, code, message)?;
        self.native.store_ptr(cell.as_ptr(), err)
    }

    pub fn read_error(&self, ptr: u64) -> Result<NativeError, HeapError> {
        self.native.heap().read_error(ptr)
    }

    /// Call a function pointer received as an argument.
    ///
    /// A script exception inside the callback does not unwind native code:
    /// it is recorded as pending and the callback returns zero.
    pub fn invoke_callback(&self, function: Argument, args: &[Argument]) -> Result<Argument, HeapError> {
        match call_trampoline(self.repo, self.native, function.as_ptr(), args) {
            Ok(ret) => Ok(ret),
            Err(err) => {
                warn!(error = %err, "callback raised; deferring until the native call returns");
                self.native.raise_pending(err);
                Ok(Argument::NULL)
            }
        }
    }

    /// Call a `GDestroyNotify` with its user data.
    pub fn destroy_notify(&self, destroy: Argument, user_data: Argument) -> Result<(), HeapError> {
        if destroy.is_null() {
            return Ok(());
        }
        debug!(user_data = user_data.as_ptr(), "destroy notify");
        self.invoke_callback(destroy, &[user_data])?;
        Ok(())
    }
}
