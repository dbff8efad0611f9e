use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use troupe_core::state::{State, StateUpdate};

use super::compiled::CompiledGraph;
use super::error::GraphError;
use super::node::NodeAction;

/// Outer state to inner initial state. The `&str` is the adapter's node name.
pub type ProjectIn = Arc<dyn Fn(&str, &State, &CompiledGraph) -> Result<State, GraphError> + Send + Sync>;

/// Inner final state to the update merged into the outer graph.
pub type ProjectOut = Arc<dyn Fn(&str, State) -> Result<StateUpdate, GraphError> + Send + Sync>;

/// Mounts a compiled graph as a single node of another graph.
///
/// One hop of the outer graph runs the inner graph to its terminal sentinel
/// under its own step budget. Errors raised inside the inner run propagate
/// unchanged.
#[derive(Clone)]
pub struct Subgraph {
    name: String,
    graph: CompiledGraph,
    project_in: ProjectIn,
    project_out: ProjectOut,
    step_limit: usize,
}

impl Subgraph {
    /// Adapter with the default projections: the last outer message seeds
    /// the inner run and only the inner graph's last message comes back.
    pub fn new(name: impl Into<String>, graph: CompiledGraph, step_limit: usize) -> Self {
        Self {
            name: name.into(),
            graph,
            project_in: Arc::new(seed_from_last_message),
            project_out: Arc::new(last_message_only),
            step_limit,
        }
    }

    pub fn with_project_in(
        mut self,
        f: impl Fn(&str, &State, &CompiledGraph) -> Result<State, GraphError> + Send + Sync + 'static,
    ) -> Self {
        self.project_in = Arc::new(f);
        self
    }

    pub fn with_project_out(
        mut self,
        f: impl Fn(&str, State) -> Result<StateUpdate, GraphError> + Send + Sync + 'static,
    ) -> Self {
        self.project_out = Arc::new(f);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }
}

impl NodeAction for Subgraph {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate, GraphError>> {
        Box::pin(async move {
            let initial = (self.project_in)(&self.name, &state, &self.graph)?;
            info!(subgraph = %self.name, entry = %self.graph.entry(), "Entering subgraph");
            let inner = self.graph.invoke(initial, self.step_limit).await?;
            debug!(subgraph = %self.name, messages = inner.messages.len(), "Subgraph finished");
            (self.project_out)(&self.name, inner)
        })
    }
}

impl std::fmt::Debug for Subgraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subgraph")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .field("step_limit", &self.step_limit)
            .finish_non_exhaustive()
    }
}

/// Default project-in.
pub fn seed_from_last_message(
    name: &str,
    outer: &State,
    inner: &CompiledGraph,
) -> Result<State, GraphError> {
    let last = outer
        .last_message()
        .ok_or_else(|| GraphError::composition(name, "outer transcript is empty"))?;
    Ok(State::seeded(last.content()).with_team_members(inner.members()))
}

/// Default project-out.
pub fn last_message_only(name: &str, inner: State) -> Result<StateUpdate, GraphError> {
    inner
        .messages
        .into_iter()
        .last()
        .map(StateUpdate::message)
        .ok_or_else(|| GraphError::composition(name, "inner run produced no messages"))
}
