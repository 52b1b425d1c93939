use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use cascade::ModuleStatus;
use cascade::foreign::{ForeignHandle, ForeignRuntime};

/// A module owned by [`FakeForeignRuntime`].
#[derive(Debug)]
pub struct FakeHandle {
    name: String,
    basename: String,
    code_version: String,
    status: Mutex<ModuleStatus>,
    parameters: String,
}

impl FakeHandle {
    pub fn set_status(&self, status: ModuleStatus) {
        *self.status.lock().unwrap() = status;
    }
}

impl ForeignHandle for FakeHandle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn basename(&self) -> String {
        self.basename.clone()
    }

    fn code_version_hash(&self) -> String {
        self.code_version.clone()
    }

    fn status(&self) -> ModuleStatus {
        *self.status.lock().unwrap()
    }

    fn parameters_text(&self) -> String {
        self.parameters.clone()
    }
}

/// In-process stand-in for an external module runtime.
///
/// - records every `run_by_name` call
/// - marks modules `Done` on success
/// - fails the modules named in [`fail`](Self::fail), leaving them `Running`
#[derive(Debug, Default)]
pub struct FakeForeignRuntime {
    modules: Mutex<BTreeMap<String, Arc<FakeHandle>>>,
    types: Vec<String>,
    failing: Mutex<HashSet<String>>,
    runs: Mutex<Vec<String>>,
}

impl FakeForeignRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: &[&str]) -> Self {
        Self {
            types: types.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Register a module instance; `parameters` is its JSON parameter text.
    pub fn add_module(&self, name: &str, basename: &str, parameters: &str) -> Arc<FakeHandle> {
        let handle = Arc::new(FakeHandle {
            name: name.to_string(),
            basename: basename.to_string(),
            code_version: format!("{basename}-native-1"),
            status: Mutex::new(ModuleStatus::Pending),
            parameters: parameters.to_string(),
        });
        self.modules
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&handle));
        handle
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Names passed to `run_by_name`, in call order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

impl ForeignRuntime for FakeForeignRuntime {
    fn run_by_name(&self, name: &str) -> anyhow::Result<()> {
        self.runs.lock().unwrap().push(name.to_string());

        let handle = self
            .modules
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("foreign module '{name}' does not exist"))?;

        if self.failing.lock().unwrap().contains(name) {
            handle.set_status(ModuleStatus::Running);
            anyhow::bail!("foreign module '{name}' crashed");
        }

        handle.set_status(ModuleStatus::Done);
        Ok(())
    }

    fn handle(&self, name: &str) -> Option<Arc<dyn ForeignHandle>> {
        self.modules
            .lock()
            .unwrap()
            .get(name)
            .map(|h| Arc::clone(h) as Arc<dyn ForeignHandle>)
    }

    fn available_types(&self) -> Vec<String> {
        self.types.clone()
    }

    fn registered_names(&self) -> Vec<String> {
        self.modules.lock().unwrap().keys().cloned().collect()
    }
}
