// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the dependency graph, its validation and DOT export.
//! - [`state`] is the per-run state machine deciding which nodes are ready
//!   and failing dependents of nodes that did not complete.
//! - [`scheduler`] owns the nodes and their actions and drives a run,
//!   sequentially or on a worker pool.

pub mod graph;
pub mod scheduler;
pub(crate) mod state;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ModuleStatus;

pub use graph::DagGraph;
pub use scheduler::DagScheduler;

/// Zero-argument unit of work bound to a node when it is added.
pub type NodeAction = Box<dyn FnOnce() -> anyhow::Result<ActionOutcome> + Send>;

/// What an action reports back when it returns normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran to an end state that lets dependents proceed
    /// (`Done` or `Skipped` for modules).
    Completed,
    /// The action stopped because of an interrupt.
    Interrupted,
}

impl From<ModuleStatus> for ActionOutcome {
    fn from(status: ModuleStatus) -> Self {
        match status {
            ModuleStatus::Interrupted => ActionOutcome::Interrupted,
            _ => ActionOutcome::Completed,
        }
    }
}

/// Terminal outcome of a node in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Completed,
    /// Interrupted while running, or not started because the interrupt
    /// token was already set.
    Interrupted,
    /// Not run because `dependency` did not complete.
    DependencyFailed { dependency: String },
    /// The action returned an error (or panicked on a worker).
    Failed { error: String },
}

impl NodeOutcome {
    pub fn allows_dependents(&self) -> bool {
        matches!(self, NodeOutcome::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeOutcome::Completed => "completed",
            NodeOutcome::Interrupted => "interrupted",
            NodeOutcome::DependencyFailed { .. } => "dependency-failed",
            NodeOutcome::Failed { .. } => "failed",
        }
    }
}

impl From<ActionOutcome> for NodeOutcome {
    fn from(outcome: ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Completed => NodeOutcome::Completed,
            ActionOutcome::Interrupted => NodeOutcome::Interrupted,
        }
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeOutcome::DependencyFailed { dependency } => {
                write!(f, "dependency-failed ({dependency})")
            }
            NodeOutcome::Failed { error } => write!(f, "failed ({error})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Result of a completed `run`: the validated order and every node's outcome.
#[derive(Debug, Clone, Default)]
pub struct DagReport {
    /// Topological order computed during validation.
    pub order: Vec<String>,
    pub outcomes: BTreeMap<String, NodeOutcome>,
}

impl DagReport {
    pub fn outcome(&self, name: &str) -> Option<&NodeOutcome> {
        self.outcomes.get(name)
    }

    /// Nodes whose outcome is anything other than `Completed`.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &NodeOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.allows_dependents())
            .map(|(n, o)| (n.as_str(), o))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn is_success(&self) -> bool {
        !self.has_failures()
    }
}

/// A parameter link: before `to` runs, its parameter `to_key` is set to the
/// current value of `from`'s parameter `from_key`.
///
/// Links are data-flow annotations only; they do not add scheduling edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamLink {
    pub from: String,
    pub from_key: String,
    pub to: String,
    pub to_key: String,
}

impl ParamLink {
    pub fn new(
        from: impl Into<String>,
        from_key: impl Into<String>,
        to: impl Into<String>,
        to_key: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            from_key: from_key.into(),
            to: to.into(),
            to_key: to_key.into(),
        }
    }
}

impl fmt::Display for ParamLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} -> {}.{}", self.from, self.from_key, self.to, self.to_key)
    }
}
