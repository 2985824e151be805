//! The runtime: metadata, native library and native state for one script
//! context.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::function::CallableDescriptor;
use crate::logging::{debug, info};
use crate::marshal::Marshaler;
use crate::native::{NativeContext, NativeLibrary};
use crate::repository::{Repository, not_found};
use crate::value::Value;

/// Binds repository callables to a native library.
///
/// Descriptors are created on first bind and cached by qualified name, so a
/// callable is prepared at most once per runtime.
pub struct Runtime {
    repository: Rc<dyn Repository>,
    library: Rc<dyn NativeLibrary>,
    native: NativeContext,
    config: BridgeConfig,
    bindings: RefCell<HashMap<String, Rc<CallableDescriptor>>>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new(repository: impl Repository + 'static, library: impl NativeLibrary + 'static) -> Self {
        Self::with_config(Rc::new(repository), Rc::new(library), BridgeConfig::default())
    }

    pub fn with_config(
        repository: Rc<dyn Repository>,
        library: Rc<dyn NativeLibrary>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            repository,
            library,
            native: NativeContext::new(config.callbacks.unscoped),
            config,
            bindings: RefCell::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &dyn Repository {
        self.repository.as_ref()
    }

    pub fn library(&self) -> &dyn NativeLibrary {
        self.library.as_ref()
    }

    pub fn native(&self) -> &NativeContext {
        &self.native
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn marshaler(&self) -> Marshaler<'_> {
        Marshaler::new(self.repository(), &self.native)
    }

    /// Bind a callable by `Namespace.name` or `Namespace.Type.method`.
    pub fn bind(&self, qualified: &str) -> Result<Rc<CallableDescriptor>> {
        if let Some(descriptor) = self.bindings.borrow().get(qualified) {
            return Ok(descriptor.clone());
        }
        let info = self
            .repository
            .find_callable(qualified)
            .ok_or_else(|| not_found(qualified))?;
        let descriptor = Rc::new(CallableDescriptor::new(info));
        self.bindings
            .borrow_mut()
            .insert(qualified.to_string(), descriptor.clone());
        debug!(callable = qualified, "bound");
        Ok(descriptor)
    }

    /// Bind every function and method of a namespace.
    ///
    /// Functions are keyed by name, methods by `Type_method`.
    pub fn bind_namespace(&self, namespace: &str) -> Result<BTreeMap<String, Rc<CallableDescriptor>>> {
        if !self.repository.namespaces().iter().any(|ns| ns == namespace) {
            return Err(not_found(namespace));
        }
        let mut bound = BTreeMap::new();
        for function in self.repository.functions(namespace) {
            let descriptor = self.bind(&function.qualified_name())?;
            bound.insert(function.name.clone(), descriptor);
        }
        for base in self.repository.infos(namespace) {
            for method in &base.methods {
                let descriptor = self.bind(&method.qualified_name())?;
                bound.insert(format!("{}_{}", base.name, method.name), descriptor);
            }
        }
        info!(namespace, count = bound.len(), "namespace bound");
        Ok(bound)
    }

    /// Bind and invoke in one step.
    pub fn call(&self, qualified: &str, receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
        self.bind(qualified)?.invoke(self, receiver, args)
    }

    /// Wrap a native pointer as a script object, reusing its live wrapper.
    pub fn wrap_pointer(&self, ptr: u64, type_name: &str, owned: bool) -> Value {
        if ptr == 0 {
            return Value::Null;
        }
        Value::Object(self.native.wrap(ptr, type_name, owned))
    }

    /// Free the native memory an owned object wrapper holds. Other values are
    /// left alone.
    pub fn release(&self, value: &Value) -> Result<()> {
        if let Value::Object(obj) = value {
            self.native.release_object(obj).map_err(Error::from)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<_> = self.bindings.borrow().keys().cloned().collect();
        bound.sort();
        f.debug_struct("Runtime")
            .field("namespaces", &self.repository.namespaces())
            .field("bound", &bound)
            .field("native", &self.native)
            .finish_non_exhaustive()
    }
}
