// src/module/lifecycle.rs

//! Run state machine for a single Local module.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::cache::DedupCache;
use crate::errors::{CascadeError, Result};
use crate::interrupt::InterruptToken;
use crate::module::{Module, Parameters, fingerprint};
use crate::types::ModuleStatus;

/// Status of a Local module, shared with the registry so it can be read
/// while the module is locked for a run.
#[derive(Debug, Clone)]
pub struct StatusCell(Arc<Mutex<ModuleStatus>>);

impl StatusCell {
    fn new(status: ModuleStatus) -> Self {
        Self(Arc::new(Mutex::new(status)))
    }

    pub fn get(&self) -> ModuleStatus {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, status: ModuleStatus) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// A registered Local module: the user implementation plus the state the
/// controller tracks for it.
pub struct LocalModule {
    name: String,
    module: Box<dyn Module>,
    params: Parameters,
    status: StatusCell,
    result: Option<Value>,
    /// Fingerprint most recently computed for this instance.
    fingerprint: Option<String>,
}

impl fmt::Debug for LocalModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalModule")
            .field("name", &self.name)
            .field("basename", &self.module.basename())
            .field("status", &self.status.get())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl LocalModule {
    pub fn new(name: impl Into<String>, module: Box<dyn Module>) -> Self {
        let params = module.default_parameters();
        Self {
            name: name.into(),
            module,
            params,
            status: StatusCell::new(ModuleStatus::Pending),
            result: None,
            fingerprint: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn basename(&self) -> &str {
        self.module.basename()
    }

    pub fn code_version_hash(&self) -> &str {
        self.module.code_version_hash()
    }

    pub fn describe(&self) -> String {
        self.module.describe()
    }

    pub fn status(&self) -> ModuleStatus {
        self.status.get()
    }

    /// Handle on this module's status that stays readable during a run.
    pub fn status_cell(&self) -> StatusCell {
        self.status.clone()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Mutable access to the parameters (before or between runs).
    pub fn params_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.set(key, value);
    }

    /// Fingerprint of the current configuration.
    pub fn compute_fingerprint(&self) -> String {
        fingerprint(
            self.module.basename(),
            self.module.code_version_hash(),
            &self.params,
        )
    }

    fn set_status(&mut self, status: ModuleStatus) {
        self.status.set(status);
        info!(module = %self.name, status = %status, "status changed");
    }

    fn interrupted(&mut self, interrupt: &InterruptToken, after: &str) -> bool {
        if interrupt.is_interrupted() {
            warn!(module = %self.name, after, "interrupt detected; stopping module");
            self.set_status(ModuleStatus::Interrupted);
            true
        } else {
            false
        }
    }

    /// Drive `init -> execute -> finalize`.
    ///
    /// Returns the terminal status (`Done`, `Interrupted` or `Skipped`). Hook
    /// errors propagate as [`CascadeError::HookFailure`] and leave the status
    /// at the phase that was in progress; nothing is recorded in the cache.
    pub fn run(&mut self, cache: &DedupCache, interrupt: &InterruptToken) -> Result<ModuleStatus> {
        self.set_status(ModuleStatus::Initializing);
        self.module
            .init(&mut self.params)
            .map_err(|source| self.hook_failure("init", source))?;

        if self.interrupted(interrupt, "init") {
            return Ok(self.status());
        }

        cache.load();

        if self.params.dry_run() {
            info!(
                module = %self.name,
                params = %self.params,
                "dry run enabled; parameters shown, execution skipped"
            );
            self.set_status(ModuleStatus::Skipped);
            return Ok(self.status());
        }

        if self.params.force_run() {
            info!(module = %self.name, "force run enabled; duplicate check bypassed");
        } else {
            let fp = self.compute_fingerprint();
            let duplicate = cache.contains(&fp);
            self.fingerprint = Some(fp);
            if duplicate {
                error!(
                    module = %self.name,
                    fingerprint = self.fingerprint.as_deref().unwrap_or_default(),
                    "duplicate run detected; identical configuration already completed"
                );
                self.set_status(ModuleStatus::Skipped);
                return Ok(self.status());
            }
        }

        self.set_status(ModuleStatus::Running);
        let result = self
            .module
            .execute(&mut self.params)
            .map_err(|source| self.hook_failure("execute", source))?;
        self.result = Some(result);

        if self.interrupted(interrupt, "execute") {
            return Ok(self.status());
        }

        self.set_status(ModuleStatus::Finalizing);
        self.module
            .finalize(&mut self.params)
            .map_err(|source| self.hook_failure("finalize", source))?;

        if self.interrupted(interrupt, "finalize") {
            return Ok(self.status());
        }

        // Parameters may have been changed by execute/finalize; the entry is
        // recorded under the final configuration.
        let fp = self.compute_fingerprint();
        cache.record(&fp);
        self.fingerprint = Some(fp);

        self.set_status(ModuleStatus::Done);
        Ok(self.status())
    }

    fn hook_failure(&self, phase: &'static str, source: anyhow::Error) -> CascadeError {
        error!(module = %self.name, phase, error = %source, "module hook failed");
        CascadeError::HookFailure {
            module: self.name.clone(),
            phase,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::module::params::{DRY_RUN, FORCE_RUN};

    /// Records hook calls; optionally fails or interrupts in a given phase.
    struct Recorder {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_in: Option<&'static str>,
        interrupt_in: Option<(&'static str, InterruptToken)>,
        tune_in_execute: bool,
    }

    impl Recorder {
        fn new(calls: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                calls,
                fail_in: None,
                interrupt_in: None,
                tune_in_execute: false,
            }
        }

        fn hit(&self, phase: &'static str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(phase);
            if let Some((p, token)) = &self.interrupt_in {
                if *p == phase {
                    token.interrupt();
                }
            }
            if self.fail_in == Some(phase) {
                anyhow::bail!("{phase} exploded");
            }
            Ok(())
        }
    }

    impl Module for Recorder {
        fn basename(&self) -> &str {
            "recorder"
        }

        fn code_version_hash(&self) -> &str {
            "v1"
        }

        fn init(&mut self, _params: &mut Parameters) -> anyhow::Result<()> {
            self.hit("init")
        }

        fn execute(&mut self, params: &mut Parameters) -> anyhow::Result<Value> {
            self.hit("execute")?;
            if self.tune_in_execute {
                params.set("tuned", true);
            }
            Ok(json!(42))
        }

        fn finalize(&mut self, _params: &mut Parameters) -> anyhow::Result<()> {
            self.hit("finalize")
        }
    }

    fn recording_module(name: &str) -> (LocalModule, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let module = LocalModule::new(name, Box::new(Recorder::new(calls.clone())));
        (module, calls)
    }

    #[test]
    fn clean_run_reaches_done_and_records_fingerprint() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let (mut m, calls) = recording_module("p");

        let status = m.run(&cache, &token).unwrap();

        assert_eq!(status, ModuleStatus::Done);
        assert_eq!(*calls.lock().unwrap(), vec!["init", "execute", "finalize"]);
        assert_eq!(m.result(), Some(&json!(42)));
        assert!(cache.contains(&m.compute_fingerprint()));
    }

    #[test]
    fn second_identical_run_is_skipped() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let (mut first, _) = recording_module("first");
        let (mut second, calls) = recording_module("second");

        assert_eq!(first.run(&cache, &token).unwrap(), ModuleStatus::Done);
        assert_eq!(second.run(&cache, &token).unwrap(), ModuleStatus::Skipped);
        assert_eq!(*calls.lock().unwrap(), vec!["init"]);
    }

    #[test]
    fn force_run_bypasses_duplicate_check() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let (mut first, _) = recording_module("first");
        let (mut second, _) = recording_module("second");
        first.set_param(FORCE_RUN, true);
        second.set_param(FORCE_RUN, true);

        assert_eq!(first.run(&cache, &token).unwrap(), ModuleStatus::Done);
        assert_eq!(second.run(&cache, &token).unwrap(), ModuleStatus::Done);
        assert_eq!(cache.len(), 1, "identical configs share a fingerprint");
    }

    #[test]
    fn dry_run_skips_without_touching_the_cache() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let (mut m, calls) = recording_module("p");
        m.set_param(DRY_RUN, true);

        assert_eq!(m.run(&cache, &token).unwrap(), ModuleStatus::Skipped);
        assert_eq!(*calls.lock().unwrap(), vec!["init"]);
        assert!(cache.is_empty());
    }

    #[test]
    fn interrupt_during_init_stops_before_execute() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder::new(calls.clone());
        recorder.interrupt_in = Some(("init", token.clone()));
        let mut m = LocalModule::new("p", Box::new(recorder));

        assert_eq!(m.run(&cache, &token).unwrap(), ModuleStatus::Interrupted);
        assert_eq!(*calls.lock().unwrap(), vec!["init"]);
        assert!(cache.is_empty());
    }

    #[test]
    fn interrupt_during_execute_leaves_no_cache_entry() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder::new(calls.clone());
        recorder.interrupt_in = Some(("execute", token.clone()));
        let mut m = LocalModule::new("p", Box::new(recorder));

        assert_eq!(m.run(&cache, &token).unwrap(), ModuleStatus::Interrupted);
        assert_eq!(*calls.lock().unwrap(), vec!["init", "execute"]);
        assert!(cache.is_empty());
    }

    #[test]
    fn hook_failure_propagates_and_keeps_phase_status() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder::new(calls);
        recorder.fail_in = Some("execute");
        let mut m = LocalModule::new("p", Box::new(recorder));

        let err = m.run(&cache, &token).unwrap_err();
        match err {
            CascadeError::HookFailure { module, phase, .. } => {
                assert_eq!(module, "p");
                assert_eq!(phase, "execute");
            }
            other => panic!("expected HookFailure, got {other:?}"),
        }
        assert_eq!(m.status(), ModuleStatus::Running);
        assert!(cache.is_empty());
    }

    #[test]
    fn self_tuning_module_is_recorded_under_final_parameters() {
        let cache = DedupCache::in_memory();
        let token = InterruptToken::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder::new(calls);
        recorder.tune_in_execute = true;
        let mut m = LocalModule::new("p", Box::new(recorder));

        let before = m.compute_fingerprint();
        assert_eq!(m.run(&cache, &token).unwrap(), ModuleStatus::Done);

        assert!(!cache.contains(&before));
        assert!(cache.contains(&m.compute_fingerprint()));
    }
}
