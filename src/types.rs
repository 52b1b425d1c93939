use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a module.
///
/// A Local module walks `Pending -> Initializing -> Running -> Finalizing`
/// and ends in one of the terminal states `Done`, `Interrupted` or
/// `Skipped`. A hook failure leaves the status at the phase that was in
/// progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleStatus {
    Pending,
    Initializing,
    Running,
    Finalizing,
    Done,
    Interrupted,
    Skipped,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Pending => "Pending",
            ModuleStatus::Initializing => "Initializing",
            ModuleStatus::Running => "Running",
            ModuleStatus::Finalizing => "Finalizing",
            ModuleStatus::Done => "Done",
            ModuleStatus::Interrupted => "Interrupted",
            ModuleStatus::Skipped => "Skipped",
        }
    }

    /// `Done`, `Interrupted` and `Skipped` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModuleStatus::Done | ModuleStatus::Interrupted | ModuleStatus::Skipped
        )
    }
}

impl Default for ModuleStatus {
    fn default() -> Self {
        ModuleStatus::Pending
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ModuleStatus::Pending),
            "initializing" => Ok(ModuleStatus::Initializing),
            "running" => Ok(ModuleStatus::Running),
            "finalizing" => Ok(ModuleStatus::Finalizing),
            "done" => Ok(ModuleStatus::Done),
            "interrupted" => Ok(ModuleStatus::Interrupted),
            "skipped" => Ok(ModuleStatus::Skipped),
            other => Err(format!("invalid module status: {other}")),
        }
    }
}

/// Who owns a module's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// init/execute/finalize are driven by this controller.
    Local,
    /// Lifecycle is owned by an external runtime; we only hold a handle.
    Foreign,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Local => f.write_str("local"),
            ModuleKind::Foreign => f.write_str("foreign"),
        }
    }
}

/// How the DAG scheduler dispatches ready nodes.
///
/// - `Sequential`: one node at a time, in topological order (default).
/// - `Parallel`: independent branches run on blocking worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            other => Err(format!(
                "invalid execution mode: {other} (expected \"sequential\" or \"parallel\")"
            )),
        }
    }
}
