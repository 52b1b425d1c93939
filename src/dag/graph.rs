// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::ParamLink;
use crate::errors::{CascadeError, Result};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: nodes that must finish before this one can run.
    deps: Vec<String>,
    /// Direct dependents: nodes that list this one as a dependency.
    dependents: Vec<String>,
}

/// Adjacency view of a set of nodes keyed by name.
///
/// Construction never fails; [`DagGraph::validate`] checks that every
/// dependency exists and that the graph is acyclic.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: BTreeMap<String, DagNode>,
}

impl DagGraph {
    /// Build from `(name, dependencies)` pairs. Duplicate dependencies
    /// collapse to one edge.
    pub fn from_nodes<I, N, D>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let mut map: BTreeMap<String, DagNode> = BTreeMap::new();

        // First pass: nodes with their dependency lists.
        for (name, deps) in nodes {
            let deps: BTreeSet<String> = deps.into_iter().map(Into::into).collect();
            map.insert(
                name.into(),
                DagNode {
                    deps: deps.into_iter().collect(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: dependents derived from deps.
        let edges: Vec<(String, String)> = map
            .iter()
            .flat_map(|(name, node)| node.deps.iter().map(move |d| (d.clone(), name.clone())))
            .collect();
        for (dep, name) in edges {
            if let Some(dep_node) = map.get_mut(&dep) {
                dep_node.dependents.push(name);
            }
        }

        Self { nodes: map }
    }

    /// All node names, sorted.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
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

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Check dependencies and acyclicity; on success return a topological
    /// order (dependencies before dependents).
    pub fn validate(&self) -> Result<Vec<String>> {
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                if dep == name {
                    return Err(CascadeError::CycleDetected(format!(
                        "node '{name}' depends on itself"
                    )));
                }
                if !self.nodes.contains_key(dep) {
                    return Err(CascadeError::UnknownDependency {
                        node: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Edge direction: dep -> node.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        // A topological sort fails if there is a cycle.
        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(CascadeError::CycleDetected(format!(
                "cycle detected in DAG involving node '{}'",
                cycle.node_id()
            ))),
        }
    }

    /// Graphviz DOT description: one statement per node, solid edges for
    /// dependencies and dotted, labelled edges for parameter links.
    pub fn to_dot(&self, links: &[ParamLink]) -> String {
        let mut out = String::from("digraph DAG {\n");

        for (name, node) in &self.nodes {
            let _ = writeln!(out, "    {};", quote(name));
            for dep in &node.deps {
                let _ = writeln!(out, "    {} -> {};", quote(dep), quote(name));
            }
        }

        for link in links {
            let label = format!("{}→{}", link.from_key, link.to_key);
            let _ = writeln!(
                out,
                "    {} -> {} [style=dotted, label={}];",
                quote(&link.from),
                quote(&link.to),
                quote(&label)
            );
        }

        out.push_str("}\n");
        out
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
