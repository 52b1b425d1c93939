// src/dag/scheduler.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::state::RunStates;
use crate::dag::{ActionOutcome, DagGraph, DagReport, NodeAction, NodeOutcome, ParamLink};
use crate::errors::{CascadeError, Result};
use crate::interrupt::InterruptToken;

struct SchedNode {
    deps: Vec<String>,
    /// Taken by the run that executes it.
    action: Option<NodeAction>,
}

/// Holds DAG nodes with their bound actions and drives a single run.
///
/// Nodes are consumed by the run: once `run` or `run_parallel` has started,
/// further `add_node` calls and second runs are rejected.
pub struct DagScheduler {
    nodes: BTreeMap<String, SchedNode>,
    interrupt: InterruptToken,
    consumed: bool,
}

impl fmt::Debug for DagScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagScheduler")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

impl Default for DagScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DagScheduler {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            interrupt: InterruptToken::new(),
            consumed: false,
        }
    }

    pub fn with_interrupt(mut self, token: InterruptToken) -> Self {
        self.interrupt = token;
        self
    }

    /// Poll `token` before starting each node.
    pub fn set_interrupt(&mut self, token: InterruptToken) {
        self.interrupt = token;
    }

    /// Add a node. Dependencies are not checked here; `run` validates them.
    pub fn add_node<N, D, F>(&mut self, name: N, dependencies: D, action: F) -> Result<()>
    where
        N: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
        F: FnOnce() -> anyhow::Result<ActionOutcome> + Send + 'static,
    {
        if self.consumed {
            return Err(already_run());
        }

        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(CascadeError::DuplicateNode(name));
        }

        let deps: Vec<String> = dependencies.into_iter().map(Into::into).collect();
        debug!(node = %name, ?deps, "DAG node added");
        self.nodes.insert(
            name,
            SchedNode {
                deps,
                action: Some(Box::new(action)),
            },
        );
        Ok(())
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependency graph of the current nodes (no validation).
    pub fn graph(&self) -> DagGraph {
        DagGraph::from_nodes(
            self.nodes
                .iter()
                .map(|(name, node)| (name.clone(), node.deps.iter().cloned())),
        )
    }

    /// Graphviz DOT description of the nodes, their dependencies and `links`.
    pub fn to_dot(&self, links: &[ParamLink]) -> String {
        self.graph().to_dot(links)
    }

    /// Validate the graph and take every node's action. Nothing is consumed
    /// if validation fails.
    fn prepare(&mut self) -> Result<(DagGraph, Vec<String>, HashMap<String, NodeAction>)> {
        if self.consumed {
            return Err(already_run());
        }

        let graph = self.graph();
        let order = graph.validate()?;

        self.consumed = true;
        let actions = self
            .nodes
            .iter_mut()
            .filter_map(|(name, node)| node.action.take().map(|a| (name.clone(), a)))
            .collect();

        info!(nodes = graph.len(), ?order, "starting DAG run");
        Ok((graph, order, actions))
    }

    /// Run every node on the calling thread in dependency order.
    ///
    /// Fails with `CycleDetected` / `UnknownDependency` before any node runs.
    /// Action errors do not abort the run: the node is recorded as `Failed`,
    /// its dependents as `DependencyFailed`, and independent nodes continue.
    pub fn run(&mut self) -> Result<DagReport> {
        let (graph, order, mut actions) = self.prepare()?;
        let mut states = RunStates::new(&graph);

        loop {
            let ready = states.collect_ready();
            if ready.is_empty() {
                break;
            }

            for name in ready {
                let outcome = if self.interrupt.is_interrupted() {
                    warn!(node = %name, "interrupt set; node not started");
                    NodeOutcome::Interrupted
                } else {
                    run_action(&name, actions.remove(&name))
                };
                finish_node(&mut states, &name, outcome);
            }
        }

        Ok(finish_run(order, states))
    }

    /// Run independent branches concurrently.
    ///
    /// Each ready node runs on a `spawn_blocking` worker; completions flow
    /// back over a channel into the same state machine as [`run`](Self::run).
    /// The interrupt token is polled before dispatching each node.
    pub async fn run_parallel(&mut self) -> Result<DagReport> {
        let (graph, order, mut actions) = self.prepare()?;
        let mut states = RunStates::new(&graph);

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, NodeOutcome)>();
        let mut in_flight = 0usize;

        loop {
            // Dispatch everything that is ready.
            loop {
                let ready = states.collect_ready();
                if ready.is_empty() {
                    break;
                }
                for name in ready {
                    if self.interrupt.is_interrupted() {
                        warn!(node = %name, "interrupt set; node not dispatched");
                        finish_node(&mut states, &name, NodeOutcome::Interrupted);
                        continue;
                    }

                    debug!(node = %name, "dispatching node to worker");
                    let action = actions.remove(&name);
                    let worker_name = name.clone();
                    let worker =
                        tokio::task::spawn_blocking(move || run_action(&worker_name, action));

                    let tx = done_tx.clone();
                    tokio::spawn(async move {
                        let outcome = match worker.await {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                error!(node = %name, error = %e, "worker task failed");
                                NodeOutcome::Failed {
                                    error: format!("worker task failed: {e}"),
                                }
                            }
                        };
                        // The receiver lives until every in-flight node reports.
                        let _ = tx.send((name, outcome));
                    });
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                break;
            }

            match done_rx.recv().await {
                Some((name, outcome)) => {
                    in_flight -= 1;
                    finish_node(&mut states, &name, outcome);
                }
                None => {
                    warn!("completion channel closed with nodes in flight");
                    break;
                }
            }
        }

        Ok(finish_run(order, states))
    }
}

fn already_run() -> CascadeError {
    CascadeError::Other(anyhow::anyhow!(
        "DAG nodes have already been consumed by a run"
    ))
}

fn run_action(name: &str, action: Option<NodeAction>) -> NodeOutcome {
    let Some(action) = action else {
        warn!(node = %name, "node has no action; treating as completed");
        return NodeOutcome::Completed;
    };

    info!(node = %name, "running node");
    match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(outcome)) => outcome.into(),
        Ok(Err(e)) => {
            error!(node = %name, error = %format!("{e:#}"), "node action failed");
            NodeOutcome::Failed {
                error: format!("{e:#}"),
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(node = %name, panic = %message, "node action panicked");
            NodeOutcome::Failed {
                error: format!("panicked: {message}"),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn finish_node(states: &mut RunStates<'_>, name: &str, outcome: NodeOutcome) {
    match &outcome {
        NodeOutcome::Completed => debug!(node = %name, "node completed"),
        NodeOutcome::Interrupted => warn!(node = %name, "node interrupted"),
        other => warn!(node = %name, outcome = %other, "node did not complete"),
    }

    for dependent in states.complete(name, outcome) {
        warn!(node = %dependent, upstream = %name, "dependency failed; node skipped");
    }
}

fn finish_run(order: Vec<String>, states: RunStates<'_>) -> DagReport {
    let report = DagReport {
        order,
        outcomes: states.into_outcomes(),
    };

    if report.is_success() {
        info!(nodes = report.outcomes.len(), "DAG run finished");
    } else {
        warn!(
            nodes = report.outcomes.len(),
            failed = report.failures().count(),
            "DAG run finished with failures"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(
        log: &Log,
        name: &str,
    ) -> impl FnOnce() -> anyhow::Result<ActionOutcome> + Send + 'static {
        let log = log.clone();
        let name = name.to_string();
        move || {
            log.lock().unwrap().push(name);
            Ok(ActionOutcome::Completed)
        }
    }

    fn abc(log: &Log) -> DagScheduler {
        let mut dag = DagScheduler::new();
        dag.add_node("C", ["B", "A"], record(log, "C")).unwrap();
        dag.add_node("B", ["A"], record(log, "B")).unwrap();
        dag.add_node("A", Vec::<String>::new(), record(log, "A")).unwrap();
        dag
    }

    #[test]
    fn dependencies_run_first() {
        let log = Log::default();
        let mut dag = abc(&log);

        let report = dag.run().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
        assert!(report.is_success());
        assert_eq!(report.order, vec!["A", "B", "C"]);
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let log = Log::default();
        let mut dag = abc(&log);
        let err = dag.add_node("A", ["B"], record(&log, "A2")).unwrap_err();
        assert!(matches!(err, CascadeError::DuplicateNode(ref n) if n == "A"));
    }

    #[test]
    fn cycle_fails_before_anything_runs() {
        let log = Log::default();
        let mut dag = DagScheduler::new();
        dag.add_node("X", ["Y"], record(&log, "X")).unwrap();
        dag.add_node("Y", ["X"], record(&log, "Y")).unwrap();

        assert!(matches!(dag.run(), Err(CascadeError::CycleDetected(_))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_dependency_fails_validation() {
        let log = Log::default();
        let mut dag = DagScheduler::new();
        dag.add_node("A", ["missing"], record(&log, "A")).unwrap();

        assert!(matches!(
            dag.run(),
            Err(CascadeError::UnknownDependency { .. })
        ));
        // Nothing consumed; the graph can be fixed and run.
        dag.add_node("missing", Vec::<String>::new(), record(&log, "missing"))
            .unwrap();
        assert!(dag.run().unwrap().is_success());
    }

    #[test]
    fn failed_action_skips_dependents_but_not_siblings() {
        let log = Log::default();
        let mut dag = DagScheduler::new();
        dag.add_node("A", Vec::<String>::new(), || anyhow::bail!("nope"))
            .unwrap();
        dag.add_node("B", ["A"], record(&log, "B")).unwrap();
        dag.add_node("D", Vec::<String>::new(), record(&log, "D")).unwrap();

        let report = dag.run().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["D"]);
        assert!(matches!(report.outcome("A"), Some(NodeOutcome::Failed { .. })));
        assert_eq!(
            report.outcome("B"),
            Some(&NodeOutcome::DependencyFailed {
                dependency: "A".into()
            })
        );
        assert_eq!(report.outcome("D"), Some(&NodeOutcome::Completed));
    }

    #[test]
    fn interrupt_after_first_node_stops_the_rest() {
        let log = Log::default();
        let token = InterruptToken::new();
        let mut dag = DagScheduler::new().with_interrupt(token.clone());

        let a_log = log.clone();
        let a_token = token.clone();
        dag.add_node("A", Vec::<String>::new(), move || {
            a_log.lock().unwrap().push("A".into());
            a_token.interrupt();
            Ok(ActionOutcome::Completed)
        })
        .unwrap();
        dag.add_node("B", ["A"], record(&log, "B")).unwrap();
        dag.add_node("C", ["B", "A"], record(&log, "C")).unwrap();

        let report = dag.run().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A"]);
        assert_eq!(report.outcome("B"), Some(&NodeOutcome::Interrupted));
        assert_eq!(
            report.outcome("C"),
            Some(&NodeOutcome::DependencyFailed {
                dependency: "B".into()
            })
        );
    }

    #[test]
    fn nodes_are_consumed_by_a_run() {
        let log = Log::default();
        let mut dag = abc(&log);
        dag.run().unwrap();

        assert!(dag.run().is_err());
        assert!(dag.add_node("D", Vec::<String>::new(), record(&log, "D")).is_err());
    }

    #[test]
    fn dot_export_is_read_only() {
        let log = Log::default();
        let dag = abc(&log);
        let dot = dag.to_dot(&[]);
        assert!(dot.contains("\"A\" -> \"B\";"));
        assert!(dot.contains("\"B\" -> \"C\";"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parallel_run_respects_dependencies() {
        let log = Log::default();
        let mut dag = DagScheduler::new();
        dag.add_node("root", Vec::<String>::new(), record(&log, "root"))
            .unwrap();
        dag.add_node("left", ["root"], record(&log, "left")).unwrap();
        dag.add_node("right", ["root"], record(&log, "right")).unwrap();
        dag.add_node("join", ["left", "right"], record(&log, "join"))
            .unwrap();

        let report = dag.run_parallel().await.unwrap();

        let seen = log.lock().unwrap().clone();
        assert!(report.is_success());
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.first().map(String::as_str), Some("root"));
        assert_eq!(seen.last().map(String::as_str), Some("join"));
    }

    #[tokio::test]
    async fn parallel_run_with_preset_interrupt_starts_nothing() {
        let log = Log::default();
        let mut dag = abc(&log).with_interrupt(InterruptToken::interrupted());

        let report = dag.run_parallel().await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(report.outcome("A"), Some(&NodeOutcome::Interrupted));
        assert!(matches!(
            report.outcome("C"),
            Some(NodeOutcome::DependencyFailed { .. })
        ));
    }

    #[test]
    fn sequential_panic_fails_the_node_and_the_run_continues() {
        let log = Log::default();
        let mut dag = DagScheduler::new();
        dag.add_node("boom", Vec::<String>::new(), || -> anyhow::Result<ActionOutcome> {
            panic!("hook exploded")
        })
        .unwrap();
        dag.add_node("after", ["boom"], record(&log, "after")).unwrap();
        dag.add_node("other", Vec::<String>::new(), record(&log, "other"))
            .unwrap();

        let report = dag.run().unwrap();

        assert!(matches!(
            report.outcome("boom"),
            Some(NodeOutcome::Failed { error }) if error.contains("hook exploded")
        ));
        assert!(matches!(
            report.outcome("after"),
            Some(NodeOutcome::DependencyFailed { .. })
        ));
        assert_eq!(*log.lock().unwrap(), vec!["other"]);
    }

    #[tokio::test]
    async fn parallel_worker_panic_is_a_failure() {
        let log = Log::default();
        let mut dag = DagScheduler::new();
        dag.add_node("boom", Vec::<String>::new(), || -> anyhow::Result<ActionOutcome> {
            panic!("worker exploded")
        })
        .unwrap();
        dag.add_node("after", ["boom"], record(&log, "after")).unwrap();

        let report = dag.run_parallel().await.unwrap();

        assert!(matches!(report.outcome("boom"), Some(NodeOutcome::Failed { .. })));
        assert!(log.lock().unwrap().is_empty());
    }
}
