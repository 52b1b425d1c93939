// src/foreign.rs

//! Narrow dispatch interface to an external module runtime.
//!
//! Foreign modules are executed and owned elsewhere. The controller only
//! ever asks the runtime to run a module by name, to list what it knows,
//! and to hand out a [`ForeignHandle`] exposing identity, status and
//! parameters for run logging.

use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;

use crate::types::ModuleStatus;

/// Read-only view of a module owned by an external runtime.
pub trait ForeignHandle: Send + Sync + Debug {
    fn name(&self) -> String;
    fn basename(&self) -> String;
    fn code_version_hash(&self) -> String;
    fn status(&self) -> ModuleStatus;
    /// Parameters serialised by the runtime as structured text (JSON).
    fn parameters_text(&self) -> String;
}

/// Dispatch interface of an external module runtime.
pub trait ForeignRuntime: Send + Sync + Debug {
    /// Run the module registered in the runtime under `name`.
    fn run_by_name(&self, name: &str) -> anyhow::Result<()>;

    /// Handle for the module registered as `name`, if the runtime knows it.
    fn handle(&self, name: &str) -> Option<Arc<dyn ForeignHandle>>;

    /// Module types the runtime can instantiate.
    fn available_types(&self) -> Vec<String>;

    /// Module instances registered in the runtime.
    fn registered_names(&self) -> Vec<String>;
}

/// Runtime used when no external runtime is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoForeignRuntime;

impl ForeignRuntime for NoForeignRuntime {
    fn run_by_name(&self, name: &str) -> anyhow::Result<()> {
        anyhow::bail!("no foreign runtime attached; cannot run '{name}'")
    }

    fn handle(&self, _name: &str) -> Option<Arc<dyn ForeignHandle>> {
        None
    }

    fn available_types(&self) -> Vec<String> {
        Vec::new()
    }

    fn registered_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Decode a handle's parameter text into a JSON value for run logs.
///
/// Runtimes commonly describe each parameter as `{"value": ..., ...}`; those
/// wrappers are flattened to the bare value. Text that is not JSON is kept
/// verbatim as a string.
pub fn decode_parameters(text: &str) -> Value {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Value::String(text.to_string()),
    };

    match parsed {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| match v {
                    Value::Object(mut inner) if inner.contains_key("value") => {
                        (k, inner.remove("value").unwrap_or(Value::Null))
                    }
                    other => (k, other),
                })
                .collect(),
        ),
        other => other,
    }
}
