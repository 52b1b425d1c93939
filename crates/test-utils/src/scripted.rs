use std::sync::{Arc, Mutex};

use cascade::{InterruptToken, Module, Parameters};
use serde_json::Value;

/// Shared, ordered record of hook calls as `"<label>.<phase>"`.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Labels whose `execute` hook ran, in order.
    pub fn executed(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_suffix(".execute").map(str::to_string))
            .collect()
    }
}

/// A Local module whose behaviour is scripted by the test.
pub struct ScriptedModule {
    label: String,
    basename: String,
    code_version: String,
    defaults: Parameters,
    calls: CallLog,
    fail_in: Option<&'static str>,
    panic_in: Option<&'static str>,
    interrupt_in: Option<(&'static str, InterruptToken)>,
    set_in_execute: Vec<(String, Value)>,
    result: Value,
}

impl ScriptedModule {
    pub fn new(label: &str, calls: &CallLog) -> Self {
        Self {
            label: label.to_string(),
            basename: "scripted".to_string(),
            code_version: "test-v1".to_string(),
            defaults: Parameters::new(),
            calls: calls.clone(),
            fail_in: None,
            panic_in: None,
            interrupt_in: None,
            set_in_execute: Vec::new(),
            result: Value::Null,
        }
    }

    pub fn with_basename(mut self, basename: &str) -> Self {
        self.basename = basename.to_string();
        self
    }

    pub fn with_code_version(mut self, version: &str) -> Self {
        self.code_version = version.to_string();
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.defaults.set(key, value);
        self
    }

    /// Return an error from `phase` (`init`, `execute` or `finalize`).
    pub fn fail_in(mut self, phase: &'static str) -> Self {
        self.fail_in = Some(phase);
        self
    }

    /// Panic from `phase`.
    pub fn panic_in(mut self, phase: &'static str) -> Self {
        self.panic_in = Some(phase);
        self
    }

    /// Set `token` while running `phase`.
    pub fn interrupt_in(mut self, phase: &'static str, token: &InterruptToken) -> Self {
        self.interrupt_in = Some((phase, token.clone()));
        self
    }

    /// Overwrite a parameter during `execute`.
    pub fn set_in_execute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_in_execute.push((key.to_string(), value.into()));
        self
    }

    pub fn returns(mut self, value: impl Into<Value>) -> Self {
        self.result = value.into();
        self
    }

    pub fn boxed(self) -> Box<dyn Module> {
        Box::new(self)
    }

    fn hit(&self, phase: &'static str) -> anyhow::Result<()> {
        self.calls.push(format!("{}.{phase}", self.label));
        if let Some((p, token)) = &self.interrupt_in {
            if *p == phase {
                token.interrupt();
            }
        }
        if self.panic_in == Some(phase) {
            panic!("{} panicked in {phase}", self.label);
        }
        if self.fail_in == Some(phase) {
            anyhow::bail!("{} failed in {phase}", self.label);
        }
        Ok(())
    }
}

impl Module for ScriptedModule {
    fn basename(&self) -> &str {
        &self.basename
    }

    fn code_version_hash(&self) -> &str {
        &self.code_version
    }

    fn default_parameters(&self) -> Parameters {
        self.defaults.clone()
    }

    fn describe(&self) -> String {
        format!("scripted module '{}'", self.label)
    }

    fn init(&mut self, _params: &mut Parameters) -> anyhow::Result<()> {
        self.hit("init")
    }

    fn execute(&mut self, params: &mut Parameters) -> anyhow::Result<Value> {
        self.hit("execute")?;
        for (k, v) in &self.set_in_execute {
            params.set(k.clone(), v.clone());
        }
        Ok(self.result.clone())
    }

    fn finalize(&mut self, _params: &mut Parameters) -> anyhow::Result<()> {
        self.hit("finalize")
    }
}
