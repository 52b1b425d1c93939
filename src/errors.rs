// src/errors.rs

//! Crate-wide error type and helpers.

use std::sync::PoisonError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Module name already registered: {0}")]
    DuplicateName(String),

    #[error("DAG node already exists: {0}")]
    DuplicateNode(String),

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Unknown module type: {0}")]
    UnknownModuleType(String),

    #[error("Cycle detected in DAG: {0}")]
    CycleDetected(String),

    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Module '{module}' failed during {phase}: {source}")]
    HookFailure {
        module: String,
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CascadeError {
    /// Whether this error was raised by a module hook (as opposed to a
    /// validation or lookup problem detected by the controller itself).
    pub fn is_hook_failure(&self) -> bool {
        matches!(self, CascadeError::HookFailure { .. })
    }
}

/// Map a poisoned lock into a crate error instead of panicking.
pub(crate) fn lock_error<T>(e: PoisonError<T>) -> CascadeError {
    CascadeError::Other(anyhow::anyhow!("lock poisoned (a thread panicked): {e}"))
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CascadeError>;
