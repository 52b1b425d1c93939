// src/dag/state.rs

//! Per-run node state transitions.
//!
//! This is the pure core shared by the sequential and parallel drivers in
//! [`crate::dag::scheduler`]: it decides which nodes are ready, records
//! outcomes, and fails dependents of nodes that did not complete.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::dag::{DagGraph, NodeOutcome};

/// Per-run state of a node (internal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunState {
    /// Waiting on dependencies.
    Pending,
    /// Handed to a driver; the action is running (or about to).
    Running,
    /// Terminal.
    Finished(NodeOutcome),
}

/// Manages state transitions for every node of one DAG run.
pub(crate) struct RunStates<'a> {
    graph: &'a DagGraph,
    states: BTreeMap<String, RunState>,
}

impl<'a> RunStates<'a> {
    pub fn new(graph: &'a DagGraph) -> Self {
        let states = graph
            .nodes()
            .map(|n| (n.to_string(), RunState::Pending))
            .collect();
        Self { graph, states }
    }

    /// Whether every dependency of `name` finished in a way that lets
    /// dependents proceed.
    fn deps_satisfied(&self, name: &str) -> bool {
        self.graph.dependencies_of(name).iter().all(|dep| {
            matches!(
                self.states.get(dep),
                Some(RunState::Finished(outcome)) if outcome.allows_dependents()
            )
        })
    }

    /// Collect `Pending` nodes whose dependencies are satisfied, mark them
    /// `Running`, and return their names in sorted order.
    pub fn collect_ready(&mut self) -> Vec<String> {
        let ready: Vec<String> = self
            .states
            .iter()
            .filter(|(name, state)| {
                matches!(state, RunState::Pending) && self.deps_satisfied(name)
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in &ready {
            debug!(node = %name, "dependencies satisfied; marking Running");
            self.states.insert(name.clone(), RunState::Running);
        }

        ready
    }

    /// Record the outcome of `name`. If the outcome blocks dependents, they
    /// are failed transitively; their names are returned.
    pub fn complete(&mut self, name: &str, outcome: NodeOutcome) -> Vec<String> {
        let blocks = !outcome.allows_dependents();
        match self.states.get_mut(name) {
            Some(state) => *state = RunState::Finished(outcome),
            None => {
                warn!(node = %name, "completion for unknown node; ignoring");
                return Vec::new();
            }
        }

        if blocks {
            self.mark_dependents_failed(name)
        } else {
            Vec::new()
        }
    }

    /// Mark every still-pending transitive dependent of `failed` as
    /// `DependencyFailed`, naming the direct upstream node that blocked it.
    fn mark_dependents_failed(&mut self, failed: &str) -> Vec<String> {
        let mut stack: Vec<(String, String)> = self
            .graph
            .dependents_of(failed)
            .iter()
            .map(|d| (d.clone(), failed.to_string()))
            .collect();
        let mut visited = HashSet::new();
        let mut newly_failed = Vec::new();

        while let Some((name, upstream)) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(state) = self.states.get_mut(&name) {
                if matches!(state, RunState::Pending) {
                    debug!(
                        node = %name,
                        dependency = %upstream,
                        "skipping dependent due to upstream failure"
                    );
                    *state = RunState::Finished(NodeOutcome::DependencyFailed {
                        dependency: upstream,
                    });
                    newly_failed.push(name.clone());
                    stack.extend(
                        self.graph
                            .dependents_of(&name)
                            .iter()
                            .map(|d| (d.clone(), name.clone())),
                    );
                }
            }
        }

        newly_failed
    }

    pub fn all_terminal(&self) -> bool {
        self.states
            .values()
            .all(|s| matches!(s, RunState::Finished(_)))
    }

    /// Final outcomes. Nodes that never reached a terminal state (which only
    /// happens if a driver stops early) are reported as interrupted.
    pub fn into_outcomes(self) -> BTreeMap<String, NodeOutcome> {
        self.states
            .into_iter()
            .map(|(name, state)| {
                let outcome = match state {
                    RunState::Finished(outcome) => outcome,
                    RunState::Pending | RunState::Running => NodeOutcome::Interrupted,
                };
                (name, outcome)
            })
            .collect()
    }
}
