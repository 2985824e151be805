//! In-memory metadata repository loaded from JSON namespace documents.
//!
//! A document describes one namespace:
//!
//! ```json
//! {
//!   "namespace": "Demo",
//!   "version": "1.0",
//!   "functions": [{ "name": "add", "args": [...], "return_type": {"tag": "int32"} }],
//!   "types": [{ "name": "Point", "kind": "struct", "size": 8 }]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;

use super::{
    ArgInfo, BaseInfo, CallableInfo, DESTROY_NOTIFY, InfoType, Repository, TypeInfo,
};
use crate::error::{Error, Result};
use crate::logging::{debug, info};

#[derive(Debug, Deserialize)]
struct NamespaceDocument {
    namespace: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    functions: Vec<CallableInfo>,
    #[serde(default)]
    types: Vec<BaseInfo>,
}

#[derive(Debug, Default)]
struct Namespace {
    version: Option<String>,
    infos: BTreeMap<String, BaseInfo>,
    functions: BTreeMap<String, Rc<CallableInfo>>,
}

/// Metadata repository held in memory.
#[derive(Debug)]
pub struct MetadataStore {
    namespaces: BTreeMap<String, Namespace>,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    /// Create a store holding only the core `GLib` types the bridge relies on.
    pub fn new() -> Self {
        let mut store = Self {
            namespaces: BTreeMap::new(),
        };

        let (namespace, name) = DESTROY_NOTIFY.split_once('.').unwrap_or(("GLib", "DestroyNotify"));
        let mut signature = CallableInfo::new(namespace, name);
        signature.args.push(ArgInfo::new("data", TypeInfo::gpointer()).closure(0));
        let mut destroy = BaseInfo::new(namespace, name, InfoType::Callback);
        destroy.signature = Some(Rc::new(signature));
        store.insert_info(destroy);

        store
    }

    /// Parse a namespace document into a new store.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut store = Self::new();
        store.load_str(json)?;
        Ok(store)
    }

    /// Load a namespace document, returning the namespace name.
    pub fn load_str(&mut self, json: &str) -> Result<String> {
        let document: NamespaceDocument = serde_json::from_str(json)?;
        let name = document.namespace.clone();

        let ns = self.namespaces.entry(name.clone()).or_default();
        ns.version = document.version;

        let n_functions = document.functions.len();
        let n_types = document.types.len();

        for mut function in document.functions {
            function.namespace = name.clone();
            ns.functions.insert(function.name.clone(), Rc::new(function));
        }

        for mut info in document.types {
            info.namespace = name.clone();
            for method in &mut info.methods {
                let method = Rc::make_mut(method);
                method.namespace = name.clone();
                method.container = Some(info.name.clone());
            }
            if let Some(signature) = &mut info.signature {
                let signature = Rc::make_mut(signature);
                signature.namespace = name.clone();
                signature.name = info.name.clone();
            }
            ns.infos.insert(info.name.clone(), info);
        }

        info!(namespace = %name, functions = n_functions, types = n_types, "loaded namespace");
        Ok(name)
    }

    /// Load a namespace document from a file.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let content = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "reading metadata");
        self.load_str(&content)
    }

    /// Register a named info.
    pub fn insert_info(&mut self, info: BaseInfo) {
        let ns = self.namespaces.entry(info.namespace.clone()).or_default();
        ns.infos.insert(info.name.clone(), info);
    }

    /// Register a top-level function.
    pub fn insert_function(&mut self, function: CallableInfo) {
        let ns = self.namespaces.entry(function.namespace.clone()).or_default();
        ns.functions.insert(function.name.clone(), Rc::new(function));
    }

    /// Version string of a loaded namespace.
    pub fn version(&self, namespace: &str) -> Option<&str> {
        self.namespaces.get(namespace)?.version.as_deref()
    }
}

impl Repository for MetadataStore {
    fn namespaces(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }

    fn lookup(&self, namespace: &str, name: &str) -> Option<&BaseInfo> {
        self.namespaces.get(namespace)?.infos.get(name)
    }

    fn find_function(&self, namespace: &str, name: &str) -> Option<Rc<CallableInfo>> {
        self.namespaces.get(namespace)?.functions.get(name).cloned()
    }

    fn infos(&self, namespace: &str) -> Vec<&BaseInfo> {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.infos.values().collect())
            .unwrap_or_default()
    }

    fn functions(&self, namespace: &str) -> Vec<Rc<CallableInfo>> {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.functions.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Turns a lookup miss into the crate error used by binding code.
pub(crate) fn not_found(qualified: &str) -> Error {
    Error::NotFound(qualified.to_string())
}
