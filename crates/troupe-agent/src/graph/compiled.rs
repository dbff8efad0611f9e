use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use troupe_core::state::{Schema, State};

use super::edge::Edge;
use super::error::GraphError;
use super::executor::Execution;
use super::node::{Node, NodeKind};

struct GraphInner {
    nodes: HashMap<String, Node>,
    order: Vec<String>,
    edges: HashMap<String, Edge>,
    entry: String,
    schema: Schema,
}

/// An immutable, validated graph. Cheap to clone; every clone shares the
/// same topology, and each [`stream`](Self::stream) call owns its own state.
#[derive(Clone)]
pub struct CompiledGraph {
    inner: Arc<GraphInner>,
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: Vec<Node>,
        edges: HashMap<String, Edge>,
        entry: String,
        schema: Schema,
    ) -> Self {
        let order = nodes.iter().map(|n| n.name().to_string()).collect();
        let nodes = nodes
            .into_iter()
            .map(|n| (n.name().to_string(), n))
            .collect();
        Self {
            inner: Arc::new(GraphInner {
                nodes,
                order,
                edges,
                entry,
                schema,
            }),
        }
    }

    pub fn entry(&self) -> &str {
        &self.inner.entry
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.inner.nodes.get(name)
    }

    pub fn edge(&self, name: &str) -> Option<&Edge> {
        self.inner.edges.get(name)
    }

    /// Node names in registration order.
    pub fn node_names(&self) -> &[String] {
        &self.inner.order
    }

    /// Worker and subgraph nodes, in registration order.
    pub fn members(&self) -> Vec<String> {
        self.inner
            .order
            .iter()
            .filter(|name| {
                self.node(name)
                    .is_some_and(|n| matches!(n.kind(), NodeKind::Worker | NodeKind::Subgraph))
            })
            .cloned()
            .collect()
    }

    /// Start a run. Nothing executes until the returned [`Execution`] is
    /// polled.
    pub fn stream(&self, initial: State, step_limit: usize) -> Execution {
        Execution::new(self.clone(), initial, step_limit)
    }

    /// Drive a run to completion and return the final state.
    pub async fn invoke(&self, initial: State, step_limit: usize) -> Result<State, GraphError> {
        self.stream(initial, step_limit).run_to_end().await
    }

    /// Human-readable topology, one node per line.
    pub fn describe(&self) -> String {
        let mut out = format!("entry: {}\n", self.inner.entry);
        for name in &self.inner.order {
            let kind = self
                .node(name)
                .map(|n| n.kind().to_string())
                .unwrap_or_default();
            let route = match self.edge(name) {
                Some(Edge::Direct(target)) => target.to_string(),
                Some(Edge::Conditional { mapping, .. }) => {
                    let arms: Vec<String> = mapping
                        .iter()
                        .map(|(key, target)| format!("{key}: {target}"))
                        .collect();
                    format!("{{ {} }}", arms.join(", "))
                }
                None => String::new(),
            };
            let _ = writeln!(out, "  {name} [{kind}] -> {route}");
        }
        out
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("entry", &self.inner.entry)
            .field("nodes", &self.inner.order)
            .finish()
    }
}
