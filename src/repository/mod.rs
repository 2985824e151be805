//! Read-only access to introspection metadata.
//!
//! The bridge never owns metadata; it queries a [`Repository`] handle that is
//! passed explicitly to every component. [`MetadataStore`] is the in-memory
//! implementation, loaded from JSON namespace documents.

mod info;
mod store;

pub use info::{
    ArgInfo, ArrayType, BaseInfo, CallableInfo, Direction, InfoType, ScopeType, Transfer,
    TypeInfo, TypeTag,
};
pub use store::MetadataStore;
pub(crate) use store::not_found;

use std::rc::Rc;

/// Qualified name of the destroy-notify callback type.
pub const DESTROY_NOTIFY: &str = "GLib.DestroyNotify";

/// Upper bound on parent-chain walks; guards against cyclic metadata.
const MAX_TYPE_DEPTH: usize = 64;

/// Query interface over introspection metadata.
pub trait Repository {
    /// Names of all loaded namespaces.
    fn namespaces(&self) -> Vec<String>;

    /// Find a named info in a namespace.
    fn lookup(&self, namespace: &str, name: &str) -> Option<&BaseInfo>;

    /// Find a top-level function in a namespace.
    fn find_function(&self, namespace: &str, name: &str) -> Option<Rc<CallableInfo>>;

    /// All named infos of a namespace.
    fn infos(&self, namespace: &str) -> Vec<&BaseInfo>;

    /// All top-level functions of a namespace.
    fn functions(&self, namespace: &str) -> Vec<Rc<CallableInfo>>;

    /// Find an info by its qualified `Namespace.Name`.
    fn resolve(&self, qualified: &str) -> Option<&BaseInfo> {
        let (namespace, name) = qualified.split_once('.')?;
        self.lookup(namespace, name)
    }

    /// Find a function or method by `Namespace.name` or `Namespace.Type.method`.
    fn find_callable(&self, qualified: &str) -> Option<Rc<CallableInfo>> {
        let mut parts = qualified.splitn(3, '.');
        let namespace = parts.next()?;
        let first = parts.next()?;
        match parts.next() {
            None => self.find_function(namespace, first),
            Some(method) => self.lookup(namespace, first)?.find_method(method).cloned(),
        }
    }

    /// The named info an interface occurrence refers to.
    fn interface_of(&self, ty: &TypeInfo) -> Option<&BaseInfo> {
        ty.interface.as_deref().and_then(|name| self.resolve(name))
    }

    /// True when `type_name` is `ancestor` or derives from it.
    fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        let mut current = Some(type_name.to_string());
        for _ in 0..MAX_TYPE_DEPTH {
            let Some(name) = current else {
                return false;
            };
            if name == ancestor {
                return true;
            }
            current = self.resolve(&name).and_then(|info| info.parent.clone());
        }
        false
    }
}
