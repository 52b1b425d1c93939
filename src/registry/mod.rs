// src/registry/mod.rs

//! Module registration.
//!
//! - [`ModuleCatalog`] is the static table of Local module *types*. Types are
//!   registered explicitly at startup; there is no runtime discovery.
//! - [`ModuleRegistry`] holds module *instances* keyed by unique name, either
//!   owned Local modules or handles to Foreign ones.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::errors::{CascadeError, Result};
use crate::foreign::ForeignHandle;
use crate::module::{LocalModule, Module, ModuleMetadata, StatusCell};
use crate::types::{ModuleKind, ModuleStatus};

type ModuleFactory = Box<dyn Fn() -> Box<dyn Module> + Send + Sync>;

struct CatalogEntry {
    metadata: ModuleMetadata,
    factory: ModuleFactory,
}

/// Static table of Local module types that can be instantiated by name.
#[derive(Default)]
pub struct ModuleCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("types", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the builtin module types.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        crate::module::builtin::register_builtins(&mut catalog);
        catalog
    }

    /// Register a module type. Registering the same type name twice replaces
    /// the earlier factory.
    pub fn register<F>(&mut self, metadata: ModuleMetadata, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        let name = metadata.name.clone();
        let entry = CatalogEntry {
            metadata,
            factory: Box::new(factory),
        };
        if self.entries.insert(name.clone(), entry).is_some() {
            warn!(module_type = %name, "module type registered twice; keeping the latest");
        } else {
            debug!(module_type = %name, "module type registered");
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Build a fresh instance of `type_name`.
    pub fn create(&self, type_name: &str) -> Result<Box<dyn Module>> {
        self.entries
            .get(type_name)
            .map(|e| (e.factory)())
            .ok_or_else(|| CascadeError::UnknownModuleType(type_name.to_string()))
    }

    pub fn type_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn metadata(&self) -> Vec<ModuleMetadata> {
        self.entries.values().map(|e| e.metadata.clone()).collect()
    }
}

/// Shared reference to a registered Local module.
///
/// The module sits behind a mutex held for the whole of a run; its name and
/// status are kept outside that lock so queries never wait on a running
/// module.
#[derive(Clone)]
pub struct LocalRef {
    name: String,
    module: Arc<Mutex<LocalModule>>,
    status: StatusCell,
}

impl fmt::Debug for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRef")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl LocalRef {
    pub fn new(module: LocalModule) -> Self {
        Self {
            name: module.name().to_string(),
            status: module.status_cell(),
            module: Arc::new(Mutex::new(module)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ModuleStatus {
        self.status.get()
    }

    /// Lock the module. A lock poisoned by a panicking hook is recovered;
    /// the status is left at the phase the hook panicked in.
    pub fn lock(&self) -> MutexGuard<'_, LocalModule> {
        self.module.lock().unwrap_or_else(|poisoned| {
            warn!(module = %self.name, "module lock poisoned by an earlier panic; recovering");
            poisoned.into_inner()
        })
    }

    pub fn same_instance(&self, other: &LocalRef) -> bool {
        Arc::ptr_eq(&self.module, &other.module)
    }
}

/// A registered module.
///
/// Local modules are owned by the registry and shared so a run can proceed
/// without holding the registry lock. Foreign modules are only ever
/// referenced through their handle.
#[derive(Clone)]
pub enum ModuleRef {
    Local(LocalRef),
    Foreign(Arc<dyn ForeignHandle>),
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleRef::Local(m) => f.debug_tuple("Local").field(m).finish(),
            ModuleRef::Foreign(h) => f.debug_tuple("Foreign").field(&h.name()).finish(),
        }
    }
}

impl ModuleRef {
    pub fn local(module: LocalModule) -> Self {
        ModuleRef::Local(LocalRef::new(module))
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            ModuleRef::Local(_) => ModuleKind::Local,
            ModuleRef::Foreign(_) => ModuleKind::Foreign,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ModuleRef::Local(m) => m.name().to_string(),
            ModuleRef::Foreign(h) => h.name(),
        }
    }

    /// Current status, read without waiting for a running module.
    pub fn status(&self) -> ModuleStatus {
        match self {
            ModuleRef::Local(m) => m.status(),
            ModuleRef::Foreign(h) => h.status(),
        }
    }

    /// Whether two references point at the same instance.
    pub fn same_instance(&self, other: &ModuleRef) -> bool {
        match (self, other) {
            (ModuleRef::Local(a), ModuleRef::Local(b)) => a.same_instance(b),
            (ModuleRef::Foreign(a), ModuleRef::Foreign(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

/// Registered module instances keyed by unique name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleRef>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` under `name`. Re-registering a name is an error.
    pub fn register(&mut self, name: &str, module: ModuleRef) -> Result<()> {
        if self.modules.contains_key(name) {
            return Err(CascadeError::DuplicateName(name.to_string()));
        }
        debug!(module = %name, kind = %module.kind(), "module registered");
        self.modules.insert(name.to_string(), module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<ModuleRef> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| CascadeError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Names of every registered module, Local and Foreign.
    pub fn list_registered(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Find the registered name of a given instance.
    pub fn name_of(&self, module: &ModuleRef) -> Option<String> {
        self.modules
            .iter()
            .find(|(_, m)| m.same_instance(module))
            .map(|(name, _)| name.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModuleRef)> {
        self.modules.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
