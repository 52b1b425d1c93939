// src/runlog.rs

//! Execution history and its YAML run log.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::Result;
use crate::types::{ModuleKind, ModuleStatus};

/// Environment override for the run-log directory.
pub const RUN_LOG_DIR_ENV: &str = "CASCADE_RUN_LOG_DIR";

/// How many module names are embedded in a run-log file name.
const NAMES_IN_FILE_NAME: usize = 5;

/// One entry of the execution history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub name: String,
    /// Module type (basename).
    pub module: String,
    pub kind: ModuleKind,
    pub codehash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub status: ModuleStatus,
    pub params: Value,
}

/// Serialised form of a run log: `modules` in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunLog<'a> {
    pub modules: &'a [ExecutionRecord],
}

/// Writes execution history to timestamped YAML files.
#[derive(Debug, Clone)]
pub struct RunLogger {
    dir: PathBuf,
}

impl RunLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Logger for `dir`, falling back to `$CASCADE_RUN_LOG_DIR` and then the
    /// per-user cache directory.
    pub fn resolve(dir: Option<&Path>) -> Self {
        Self::new(resolve_run_log_dir(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `records` to a new file and return its path.
    pub fn save(&self, records: &[ExecutionRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(file_name(
            &Local::now().format("%Y%m%d_%H%M%S").to_string(),
            records,
        ));
        let yaml = serde_yaml::to_string(&RunLog { modules: records })?;
        fs::write(&path, yaml)?;

        info!(path = %path.display(), modules = records.len(), "run log saved");
        Ok(path)
    }
}

/// `control_log_<timestamp>[_<name>...]` with up to five module names.
fn file_name(timestamp: &str, records: &[ExecutionRecord]) -> String {
    let mut name = format!("control_log_{timestamp}");
    for record in records.iter().take(NAMES_IN_FILE_NAME) {
        name.push('_');
        name.push_str(&sanitize(&record.name));
    }
    name.push_str(".yaml");
    name
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

pub fn resolve_run_log_dir(dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = dir {
        return dir.to_path_buf();
    }
    if let Some(env_dir) = std::env::var_os(RUN_LOG_DIR_ENV).filter(|v| !v.is_empty()) {
        debug!(dir = ?env_dir, "run log directory taken from environment");
        return PathBuf::from(env_dir);
    }
    default_run_log_dir()
}

fn default_run_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cascade")
        .join("run_logs")
}
