// src/controller.rs

//! Top-level facade: registration, dispatch, history and run logs.
//!
//! The controller is shared as `Arc<ExecutionController>` so that DAG node
//! actions (which may run on worker threads) can call back into it. All
//! mutable state lives behind mutexes; the registry lock is never held while
//! a module runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::DedupCache;
use crate::config::settings::resolve_cache_dir;
use crate::dag::{ActionOutcome, DagReport, DagScheduler, NodeAction, ParamLink};
use crate::errors::{CascadeError, Result, lock_error};
use crate::foreign::{ForeignRuntime, NoForeignRuntime, decode_parameters};
use crate::interrupt::InterruptToken;
use crate::module::{LocalModule, Module, ModuleMetadata};
use crate::registry::{LocalRef, ModuleCatalog, ModuleRef, ModuleRegistry};
use crate::runlog::{ExecutionRecord, RunLogger};
use crate::types::{ModuleKind, ModuleStatus};

/// Builder for [`ExecutionController`].
#[derive(Debug, Default)]
pub struct ControllerBuilder {
    cache: Option<Arc<DedupCache>>,
    interrupt: Option<InterruptToken>,
    foreign: Option<Arc<dyn ForeignRuntime>>,
    catalog: Option<ModuleCatalog>,
    run_log_dir: Option<PathBuf>,
}

impl ControllerBuilder {
    pub fn cache(mut self, cache: Arc<DedupCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn interrupt(mut self, token: InterruptToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    pub fn foreign_runtime(mut self, runtime: Arc<dyn ForeignRuntime>) -> Self {
        self.foreign = Some(runtime);
        self
    }

    pub fn catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn run_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_log_dir = Some(dir.into());
        self
    }

    /// Defaults: cache persisted under the per-user cache directory, a fresh
    /// interrupt token, no foreign runtime, the builtin catalog.
    pub fn build(self) -> ExecutionController {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(DedupCache::persistent(resolve_cache_dir(None))));
        debug!(cache = %cache.location(), "building execution controller");

        ExecutionController {
            registry: Mutex::new(ModuleRegistry::new()),
            catalog: self.catalog.unwrap_or_else(ModuleCatalog::builtin),
            foreign: self.foreign.unwrap_or_else(|| Arc::new(NoForeignRuntime)),
            cache,
            interrupt: self.interrupt.unwrap_or_default(),
            history: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
            name_counters: Mutex::new(HashMap::new()),
            run_log_dir: self.run_log_dir,
        }
    }
}

/// Registers modules, runs them (directly, in groups or through a DAG) and
/// keeps the ordered execution history.
#[derive(Debug)]
pub struct ExecutionController {
    registry: Mutex<ModuleRegistry>,
    catalog: ModuleCatalog,
    foreign: Arc<dyn ForeignRuntime>,
    cache: Arc<DedupCache>,
    interrupt: InterruptToken,
    history: Mutex<Vec<ExecutionRecord>>,
    links: Mutex<Vec<ParamLink>>,
    name_counters: Mutex<HashMap<String, usize>>,
    run_log_dir: Option<PathBuf>,
}

impl Default for ExecutionController {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExecutionController {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    pub fn interrupt_token(&self) -> &InterruptToken {
        &self.interrupt
    }

    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    fn registry(&self) -> Result<MutexGuard<'_, ModuleRegistry>> {
        self.registry.lock().map_err(lock_error)
    }

    // ---- registration ------------------------------------------------------

    /// Register a Local module instance under `name`.
    pub fn register_module(&self, name: &str, module: Box<dyn Module>) -> Result<()> {
        let basename = module.basename().to_string();
        let local = LocalModule::new(name, module);
        self.registry()?.register(name, ModuleRef::local(local))?;
        info!(module = %name, basename = %basename, "module registered");
        Ok(())
    }

    /// Instantiate a catalog type and register it. Without `name`, the
    /// instance is named `<type>_<n>`. Returns the registered name.
    pub fn create_module(&self, type_name: &str, name: Option<&str>) -> Result<String> {
        let module = self.catalog.create(type_name)?;
        let name = match name {
            Some(n) => n.to_string(),
            None => self.next_auto_name(type_name)?,
        };
        self.register_module(&name, module)?;
        Ok(name)
    }

    fn next_auto_name(&self, type_name: &str) -> Result<String> {
        let registry = self.registry()?;
        let mut counters = self.name_counters.lock().map_err(lock_error)?;
        let counter = counters.entry(type_name.to_string()).or_insert(0);
        loop {
            let candidate = format!("{type_name}_{counter}");
            *counter += 1;
            if !registry.contains(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Register a module owned by the foreign runtime under its own name.
    pub fn register_foreign(&self, name: &str) -> Result<()> {
        let handle = self
            .foreign
            .handle(name)
            .ok_or_else(|| CascadeError::NotFound(name.to_string()))?;
        self.registry()?.register(name, ModuleRef::Foreign(handle))?;
        info!(module = %name, "foreign module registered");
        Ok(())
    }

    /// Look up a registered module. Names unknown to the controller but
    /// known to the foreign runtime are registered on first use.
    pub fn module(&self, name: &str) -> Result<ModuleRef> {
        let mut registry = self.registry()?;
        if let Ok(module) = registry.get(name) {
            return Ok(module);
        }

        let handle = self
            .foreign
            .handle(name)
            .ok_or_else(|| CascadeError::NotFound(name.to_string()))?;
        let module = ModuleRef::Foreign(handle);
        registry.register(name, module.clone())?;
        debug!(module = %name, "foreign module registered on first use");
        Ok(module)
    }

    fn local(&self, name: &str) -> Result<LocalRef> {
        match self.module(name)? {
            ModuleRef::Local(m) => Ok(m),
            ModuleRef::Foreign(_) => Err(CascadeError::Config(format!(
                "module '{name}' is foreign; its parameters are owned by the external runtime"
            ))),
        }
    }

    /// Set one parameter on a Local module.
    pub fn set_param(&self, name: &str, key: &str, value: impl Into<Value>) -> Result<()> {
        let module = self.local(name)?;
        module.lock().set_param(key, value);
        Ok(())
    }

    /// Overlay `params` on a Local module's parameters.
    pub fn set_params(&self, name: &str, params: crate::module::Parameters) -> Result<()> {
        let module = self.local(name)?;
        module.lock().params_mut().merge(params);
        Ok(())
    }

    /// Before `to` runs, copy parameter `from_key` of `from` into its `to_key`.
    pub fn link_param(&self, from: &str, from_key: &str, to: &str, to_key: &str) -> Result<()> {
        if from == to {
            return Err(CascadeError::Config(format!(
                "module '{from}' cannot link a parameter to itself"
            )));
        }
        self.local(from)?;
        self.local(to)?;

        let link = ParamLink::new(from, from_key, to, to_key);
        debug!(link = %link, "parameter link added");
        self.links.lock().map_err(lock_error)?.push(link);
        Ok(())
    }

    pub fn param_links(&self) -> Vec<ParamLink> {
        match self.links.lock() {
            Ok(links) => links.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    // ---- queries -----------------------------------------------------------

    /// Status of `name`. Never waits for a running module.
    pub fn get_status(&self, name: &str) -> Result<ModuleStatus> {
        Ok(self.module(name)?.status())
    }

    /// Status of every module in [`list_registered`](Self::list_registered).
    pub fn get_all_progress(&self) -> Result<BTreeMap<String, ModuleStatus>> {
        self.list_registered()?
            .into_iter()
            .map(|name| {
                let status = self.get_status(&name)?;
                Ok((name, status))
            })
            .collect()
    }

    /// Registered instance names, Local and Foreign.
    pub fn list_registered(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.registry()?.list_registered().into_iter().collect();
        names.extend(self.foreign.registered_names());
        Ok(names.into_iter().collect())
    }

    /// Module types that can be instantiated: catalog types plus the types
    /// the foreign runtime knows.
    pub fn list_available(&self) -> Vec<String> {
        let mut types: BTreeSet<String> = self.catalog.type_names().into_iter().collect();
        types.extend(self.foreign.available_types());
        types.into_iter().collect()
    }

    pub fn available_metadata(&self) -> Vec<ModuleMetadata> {
        self.catalog.metadata()
    }

    /// One-line description of a registered module.
    pub fn describe(&self, name: &str) -> Result<String> {
        match self.module(name)? {
            ModuleRef::Local(m) => Ok(m.lock().describe()),
            ModuleRef::Foreign(h) => Ok(format!("foreign module of type {}", h.basename())),
        }
    }

    /// Current parameters of a registered module as a JSON object.
    pub fn parameters(&self, name: &str) -> Result<Value> {
        match self.module(name)? {
            ModuleRef::Local(m) => Ok(m.lock().params().to_value()),
            ModuleRef::Foreign(h) => Ok(decode_parameters(&h.parameters_text())),
        }
    }

    /// Copy of the execution history, in execution order.
    pub fn history(&self) -> Vec<ExecutionRecord> {
        match self.history.lock() {
            Ok(h) => h.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    // ---- running -----------------------------------------------------------

    /// Run the module registered as `name`.
    ///
    /// Returns the module's status after the run. Hook errors propagate;
    /// a record is still appended to the history.
    pub fn run_module(&self, name: &str) -> Result<ModuleStatus> {
        if self.interrupt.is_interrupted() {
            warn!(module = %name, "interrupt set; run skipped");
            return Ok(ModuleStatus::Interrupted);
        }

        let module = self.module(name)?;
        self.dispatch(name, module)
    }

    /// Run a module given a reference to its registered instance.
    pub fn run_module_handle(&self, module: &ModuleRef) -> Result<ModuleStatus> {
        let name = self
            .registry()?
            .name_of(module)
            .ok_or_else(|| CascadeError::NotFound(format!("{module:?}")))?;
        self.run_module(&name)
    }

    /// Run modules one after another. Stops at the first error; `Skipped`
    /// and `Interrupted` do not stop the group.
    pub fn run_group<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ModuleStatus>> {
        names.iter().map(|n| self.run_module(n.as_ref())).collect()
    }

    /// Run every module in [`list_registered`](Self::list_registered), in
    /// name order.
    pub fn run_all(&self) -> Result<Vec<ModuleStatus>> {
        let names = self.list_registered()?;
        self.run_group(&names)
    }

    fn dispatch(&self, name: &str, module: ModuleRef) -> Result<ModuleStatus> {
        match module {
            ModuleRef::Local(local) => {
                // Resolve link values before taking this module's lock.
                let linked = self.resolve_links(name)?;

                let mut guard = local.lock();
                for (key, value) in linked {
                    debug!(module = %name, key = %key, "applying linked parameter");
                    guard.set_param(key, value);
                }

                let outcome = guard.run(&self.cache, &self.interrupt);
                let record = local_record(&guard);
                drop(guard);

                self.push_history(record);
                outcome
            }
            ModuleRef::Foreign(handle) => {
                info!(module = %name, "dispatching to foreign runtime");
                let outcome = self.foreign.run_by_name(name);

                self.push_history(ExecutionRecord {
                    name: handle.name(),
                    module: handle.basename(),
                    kind: ModuleKind::Foreign,
                    codehash: handle.code_version_hash(),
                    fingerprint: None,
                    status: handle.status(),
                    params: decode_parameters(&handle.parameters_text()),
                });

                outcome.map_err(|source| CascadeError::HookFailure {
                    module: name.to_string(),
                    phase: "run",
                    source,
                })?;
                Ok(handle.status())
            }
        }
    }

    /// Values for every link targeting `name`, read from the source modules.
    fn resolve_links(&self, name: &str) -> Result<Vec<(String, Value)>> {
        let links: Vec<ParamLink> = self
            .param_links()
            .into_iter()
            .filter(|l| l.to == name)
            .collect();

        let mut values = Vec::with_capacity(links.len());
        for link in links {
            let source = self.local(&link.from)?;
            let value = source.lock().params().get(&link.from_key).cloned();
            match value {
                Some(v) => values.push((link.to_key, v)),
                None => warn!(
                    link = %link,
                    "linked source parameter is not set; target keeps its value"
                ),
            }
        }
        Ok(values)
    }

    fn push_history(&self, record: ExecutionRecord) {
        let mut history = match self.history.lock() {
            Ok(h) => h,
            Err(e) => e.into_inner(),
        };
        history.push(record);
    }

    // ---- DAG ---------------------------------------------------------------

    /// Node action that runs module `name` through this controller.
    pub fn run_action(self: &Arc<Self>, name: &str) -> NodeAction {
        let controller = Arc::clone(self);
        let name = name.to_string();
        Box::new(move || {
            let status = controller.run_module(&name)?;
            Ok(ActionOutcome::from(status))
        })
    }

    /// Add a node for module `name` to `dag`, bound to [`run_action`](Self::run_action).
    pub fn add_dag_node<D>(
        self: &Arc<Self>,
        dag: &mut DagScheduler,
        name: &str,
        dependencies: D,
    ) -> Result<()>
    where
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let action = self.run_action(name);
        dag.add_node(name, dependencies, action)
    }

    /// Run `dag` sequentially, stopping new nodes once the interrupt is set.
    pub fn run_dag(&self, dag: &mut DagScheduler) -> Result<DagReport> {
        dag.set_interrupt(self.interrupt.clone());
        dag.run()
    }

    /// Run `dag` with independent branches on worker threads.
    pub async fn run_dag_parallel(&self, dag: &mut DagScheduler) -> Result<DagReport> {
        dag.set_interrupt(self.interrupt.clone());
        dag.run_parallel().await
    }

    /// DOT description of `dag` including this controller's parameter links.
    pub fn dag_to_dot(&self, dag: &DagScheduler) -> String {
        dag.to_dot(&self.param_links())
    }

    // ---- run log -----------------------------------------------------------

    /// Write the execution history to a run log.
    ///
    /// `dir` overrides the controller's configured directory. Failures are
    /// logged and reported as `None`; they never fail the run.
    pub fn save_run_log(&self, dir: Option<&Path>) -> Option<PathBuf> {
        let dir = dir.or(self.run_log_dir.as_deref());
        let logger = RunLogger::resolve(dir);
        match logger.save(&self.history()) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(dir = %logger.dir().display(), error = %e, "failed to save run log");
                None
            }
        }
    }
}

fn local_record(module: &LocalModule) -> ExecutionRecord {
    ExecutionRecord {
        name: module.name().to_string(),
        module: module.basename().to_string(),
        kind: ModuleKind::Local,
        codehash: module.code_version_hash().to_string(),
        fingerprint: module.fingerprint().map(str::to_string),
        status: module.status(),
        params: module.params().to_value(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::module::builtin::SumModule;

    fn controller() -> ExecutionController {
        ExecutionController::builder()
            .cache(Arc::new(DedupCache::in_memory()))
            .build()
    }

    #[test]
    fn auto_names_count_per_type() {
        let ctrl = controller();
        assert_eq!(ctrl.create_module("sum", None).unwrap(), "sum_0");
        assert_eq!(ctrl.create_module("sum", None).unwrap(), "sum_1");
        assert_eq!(ctrl.create_module("dag_debug", None).unwrap(), "dag_debug_0");
        assert_eq!(ctrl.create_module("sum", Some("total")).unwrap(), "total");
        assert!(matches!(
            ctrl.create_module("nope", None),
            Err(CascadeError::UnknownModuleType(_))
        ));
    }

    #[test]
    fn auto_names_skip_taken_names() {
        let ctrl = controller();
        ctrl.register_module("sum_0", Box::new(SumModule::default())).unwrap();
        assert_eq!(ctrl.create_module("sum", None).unwrap(), "sum_1");
    }

    #[test]
    fn run_module_records_history() {
        let ctrl = controller();
        ctrl.create_module("sum", Some("s")).unwrap();
        ctrl.set_param("s", "a", 2).unwrap();
        ctrl.set_param("s", "b", 3).unwrap();

        assert_eq!(ctrl.run_module("s").unwrap(), ModuleStatus::Done);

        let history = ctrl.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, "s");
        assert_eq!(history[0].module, "sum");
        assert_eq!(history[0].status, ModuleStatus::Done);
        assert_eq!(history[0].params, json!({"a": 2, "b": 3}));
        assert!(history[0].fingerprint.is_some());
    }

    #[test]
    fn unknown_module_is_not_found() {
        let ctrl = controller();
        assert!(matches!(ctrl.run_module("ghost"), Err(CascadeError::NotFound(_))));
        assert!(matches!(ctrl.get_status("ghost"), Err(CascadeError::NotFound(_))));
    }

    #[test]
    fn interrupted_controller_does_not_start_runs() {
        let ctrl = ExecutionController::builder()
            .cache(Arc::new(DedupCache::in_memory()))
            .interrupt(InterruptToken::interrupted())
            .build();
        ctrl.create_module("sum", Some("s")).unwrap();

        assert_eq!(ctrl.run_module("s").unwrap(), ModuleStatus::Interrupted);
        assert_eq!(ctrl.get_status("s").unwrap(), ModuleStatus::Pending);
        assert!(ctrl.history().is_empty());
    }

    #[test]
    fn linked_parameter_is_copied_before_run() {
        let ctrl = controller();
        ctrl.create_module("sum", Some("src")).unwrap();
        ctrl.create_module("sum", Some("dst")).unwrap();
        ctrl.set_param("src", "a", 7).unwrap();
        ctrl.link_param("src", "a", "dst", "b").unwrap();

        ctrl.run_module("dst").unwrap();

        let history = ctrl.history();
        assert_eq!(history[0].params["b"], json!(7));
    }

    #[test]
    fn links_require_registered_distinct_modules() {
        let ctrl = controller();
        ctrl.create_module("sum", Some("a")).unwrap();
        assert!(matches!(
            ctrl.link_param("a", "x", "ghost", "y"),
            Err(CascadeError::NotFound(_))
        ));
        assert!(matches!(
            ctrl.link_param("a", "x", "a", "y"),
            Err(CascadeError::Config(_))
        ));
    }

    #[test]
    fn progress_covers_every_module() {
        let ctrl = controller();
        ctrl.create_module("sum", Some("one")).unwrap();
        ctrl.create_module("sum", Some("two")).unwrap();
        ctrl.run_module("one").unwrap();

        let progress = ctrl.get_all_progress().unwrap();
        assert_eq!(progress["one"], ModuleStatus::Done);
        assert_eq!(progress["two"], ModuleStatus::Pending);
    }

    #[test]
    fn available_lists_builtin_types() {
        let ctrl = controller();
        let types = ctrl.list_available();
        assert!(types.contains(&"sum".to_string()));
        assert_eq!(ctrl.available_metadata().len(), types.len());
    }
}
