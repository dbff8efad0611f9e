use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use troupe_core::state::{State, StateUpdate};

use super::error::GraphError;

/// The executable half of a node: accumulated state in, partial update out.
///
/// Implemented by [`Worker`](super::Worker), [`Supervisor`](super::Supervisor),
/// [`Subgraph`](super::Subgraph), and by any async closure over [`State`].
pub trait NodeAction: Send + Sync + 'static {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate, GraphError>>;
}

impl<F, Fut> NodeAction for F
where
    F: Fn(State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate, GraphError>> + Send + 'static,
{
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate, GraphError>> {
        Box::pin(self(state))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Worker,
    Supervisor,
    Subgraph,
    Function,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Worker => "worker",
            Self::Supervisor => "supervisor",
            Self::Subgraph => "subgraph",
            Self::Function => "function",
        };
        f.write_str(s)
    }
}

/// A named unit of work in a graph.
#[derive(Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    action: Arc<dyn NodeAction>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind, action: impl NodeAction) -> Self {
        Self {
            name: name.into(),
            kind,
            action: Arc::new(action),
        }
    }

    /// A plain function node.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StateUpdate, GraphError>> + Send + 'static,
    {
        Self::new(name, NodeKind::Function, f)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub async fn run(&self, state: State) -> Result<StateUpdate, GraphError> {
        self.action.run(state).await
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}
