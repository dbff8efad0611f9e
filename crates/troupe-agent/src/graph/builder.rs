use std::collections::{HashMap, HashSet};
use std::future::Future;

use tracing::debug;

use troupe_core::state::{Schema, State, StateUpdate};
use troupe_core::types::FINISH;

use super::compiled::CompiledGraph;
use super::edge::{route_on_next, Edge, Target, TERMINAL};
use super::error::{CompileError, GraphError};
use super::node::{Node, NodeKind};
use super::subgraph::Subgraph;
use super::supervisor::Supervisor;
use super::worker::Worker;

/// Collects nodes and edges; every structural check is deferred to
/// [`compile`](Self::compile).
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<(String, Edge)>,
    entries: Vec<String>,
    rosters: HashMap<String, Vec<String>>,
    schema: Schema,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prebuilt node. Duplicate names surface at compile time.
    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Register an async closure as a [`NodeKind::Function`] node.
    pub fn add_fn<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StateUpdate, GraphError>> + Send + 'static,
    {
        self.add_node(Node::from_fn(name, f))
    }

    /// Register a worker under its own name.
    pub fn add_worker(self, worker: Worker) -> Self {
        let name = worker.name().to_string();
        self.add_node(Node::new(name, NodeKind::Worker, worker))
    }

    /// Register a supervisor together with its routing edge: each roster
    /// member maps to the node of the same name and `FINISH` maps to the
    /// terminal sentinel.
    pub fn add_supervisor(mut self, supervisor: Supervisor) -> Self {
        let name = supervisor.name().to_string();
        let roster = supervisor.roster().to_vec();
        let mapping: Vec<(String, Target)> = roster
            .iter()
            .map(|m| (m.clone(), Target::Node(m.clone())))
            .chain(std::iter::once((FINISH.to_string(), Target::Terminal)))
            .collect();
        self.rosters.insert(name.clone(), roster);
        self.add_node(Node::new(name.clone(), NodeKind::Supervisor, supervisor))
            .add_conditional_edges(name, route_on_next, mapping)
    }

    /// Mount a compiled graph as a single node.
    pub fn add_subgraph(self, subgraph: Subgraph) -> Self {
        let name = subgraph.name().to_string();
        self.add_node(Node::new(name, NodeKind::Subgraph, subgraph))
    }

    /// Unconditional edge. `to` may be [`TERMINAL`].
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<Target>) -> Self {
        self.edges.push((from.into(), Edge::direct(to)));
        self
    }

    /// Route from `from` by evaluating `router` against the merged state and
    /// looking the key up in `mapping`. A key missing from the mapping is a
    /// routing error at run time.
    pub fn add_conditional_edges<K, T>(
        mut self,
        from: impl Into<String>,
        router: impl Fn(&State) -> String + Send + Sync + 'static,
        mapping: impl IntoIterator<Item = (K, T)>,
    ) -> Self
    where
        K: Into<String>,
        T: Into<Target>,
    {
        self.edges
            .push((from.into(), Edge::conditional(router, mapping)));
        self
    }

    /// Give every member of `supervisor`'s roster a direct edge back to it.
    pub fn report_to(mut self, supervisor: &str) -> Self {
        let members = self.rosters.get(supervisor).cloned().unwrap_or_default();
        for member in members {
            self.edges
                .push((member, Edge::direct(Target::Node(supervisor.to_string()))));
        }
        self
    }

    /// Name the node a run starts at. Calling this twice is a compile error.
    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entries.push(name.into());
        self
    }

    /// Replace the default reducer table.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Validate and freeze the graph.
    pub fn compile(self) -> Result<CompiledGraph, CompileError> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name() == TERMINAL {
                return Err(CompileError::ReservedName(node.name().to_string()));
            }
            if !names.insert(node.name().to_string()) {
                return Err(CompileError::DuplicateNode(node.name().to_string()));
            }
        }

        let entry = match self.entries.as_slice() {
            [] => return Err(CompileError::MissingEntry),
            [only] => only.clone(),
            [first, second, ..] => {
                return Err(CompileError::DuplicateEntry {
                    first: first.clone(),
                    second: second.clone(),
                })
            }
        };
        if !names.contains(&entry) {
            return Err(CompileError::UnknownEntry(entry));
        }

        let mut edges: HashMap<String, Edge> = HashMap::new();
        for (from, edge) in self.edges {
            if !names.contains(&from) {
                return Err(CompileError::UnknownEdgeSource(from));
            }
            for target in edge.targets() {
                if let Target::Node(to) = target {
                    if !names.contains(to) {
                        return Err(CompileError::DanglingEdge {
                            from,
                            to: to.clone(),
                        });
                    }
                }
            }
            if edges.contains_key(&from) {
                return Err(CompileError::ConflictingEdges(from));
            }
            edges.insert(from, edge);
        }

        if let Some(dead) = self.nodes.iter().find(|n| !edges.contains_key(n.name())) {
            return Err(CompileError::DeadEnd(dead.name().to_string()));
        }

        debug!(entry = %entry, nodes = self.nodes.len(), "Graph compiled");
        Ok(CompiledGraph::new(self.nodes, edges, entry, self.schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_state: State) -> Result<StateUpdate, GraphError> {
        Ok(StateUpdate::new())
    }

    #[test]
    fn test_minimal_graph_compiles() {
        let graph = GraphBuilder::new()
            .add_fn("A", noop)
            .add_edge("A", TERMINAL)
            .set_entry("A")
            .compile()
            .unwrap();
        assert_eq!(graph.entry(), "A");
    }

    #[test]
    fn test_dangling_edge() {
        let err = GraphBuilder::new()
            .add_fn("A", noop)
            .add_edge("A", "ghost")
            .set_entry("A")
            .compile()
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::DanglingEdge {
                from: "A".into(),
                to: "ghost".into()
            }
        );
    }

    #[test]
    fn test_dangling_conditional_mapping() {
        let err = GraphBuilder::new()
            .add_fn("A", noop)
            .add_conditional_edges("A", route_on_next, [("x", TERMINAL), ("y", "ghost")])
            .set_entry("A")
            .compile()
            .unwrap_err();
        assert!(matches!(err, CompileError::DanglingEdge { ref to, .. } if to == "ghost"));
    }

    #[test]
    fn test_entry_errors() {
        let missing = GraphBuilder::new().add_fn("A", noop).add_edge("A", TERMINAL).compile();
        assert_eq!(missing.unwrap_err(), CompileError::MissingEntry);

        let duplicate = GraphBuilder::new()
            .add_fn("A", noop)
            .add_edge("A", TERMINAL)
            .set_entry("A")
            .set_entry("A")
            .compile();
        assert!(matches!(duplicate.unwrap_err(), CompileError::DuplicateEntry { .. }));

        let unknown = GraphBuilder::new()
            .add_fn("A", noop)
            .add_edge("A", TERMINAL)
            .set_entry("B")
            .compile();
        assert_eq!(unknown.unwrap_err(), CompileError::UnknownEntry("B".into()));
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let dup = GraphBuilder::new()
            .add_fn("A", noop)
            .add_fn("A", noop)
            .add_edge("A", TERMINAL)
            .set_entry("A")
            .compile();
        assert_eq!(dup.unwrap_err(), CompileError::DuplicateNode("A".into()));

        let reserved = GraphBuilder::new()
            .add_fn(TERMINAL, noop)
            .set_entry(TERMINAL)
            .compile();
        assert!(matches!(reserved.unwrap_err(), CompileError::ReservedName(_)));
    }

    #[test]
    fn test_edge_shape_errors() {
        let unknown_source = GraphBuilder::new()
            .add_fn("A", noop)
            .add_edge("A", TERMINAL)
            .add_edge("Z", "A")
            .set_entry("A")
            .compile();
        assert_eq!(unknown_source.unwrap_err(), CompileError::UnknownEdgeSource("Z".into()));

        let conflicting = GraphBuilder::new()
            .add_fn("A", noop)
            .add_edge("A", TERMINAL)
            .add_edge("A", "A")
            .set_entry("A")
            .compile();
        assert_eq!(conflicting.unwrap_err(), CompileError::ConflictingEdges("A".into()));

        let dead_end = GraphBuilder::new()
            .add_fn("A", noop)
            .add_fn("B", noop)
            .add_edge("A", "B")
            .set_entry("A")
            .compile();
        assert_eq!(dead_end.unwrap_err(), CompileError::DeadEnd("B".into()));
    }
}
