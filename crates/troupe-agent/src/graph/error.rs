use thiserror::Error;

/// Structural problems found while compiling a graph. Never raised at run time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),

    #[error("'{0}' is reserved for the terminal sentinel")]
    ReservedName(String),

    #[error("no entry node set")]
    MissingEntry,

    #[error("entry set more than once ('{first}', then '{second}')")]
    DuplicateEntry { first: String, second: String },

    #[error("entry node '{0}' is not registered")]
    UnknownEntry(String),

    #[error("edge source '{0}' is not registered")]
    UnknownEdgeSource(String),

    #[error("edge {from} -> {to} points at an unregistered node")]
    DanglingEdge { from: String, to: String },

    #[error("node '{0}' declares more than one outgoing edge")]
    ConflictingEdges(String),

    #[error("node '{0}' has no outgoing edge")]
    DeadEnd(String),
}

/// Fatal execution errors. Each one ends the run that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A supervisor chose outside its roster, its policy failed, or a router
    /// produced a key missing from its mapping.
    #[error("routing error at '{node}': {reason}")]
    Routing { node: String, reason: String },

    /// The step budget ran out before reaching the terminal sentinel.
    #[error("recursion limit of {limit} steps exceeded before '{node}'")]
    RecursionLimit { limit: usize, node: String },

    /// State could not be carried across a subgraph boundary.
    #[error("composition error at '{node}': {reason}")]
    Composition { node: String, reason: String },
}

impl GraphError {
    /// Routing failure raised at `node`.
    pub fn routing(node: &str, reason: impl Into<String>) -> Self {
        Self::Routing {
            node: node.to_string(),
            reason: reason.into(),
        }
    }

    /// Projection failure at the subgraph boundary named `node`.
    pub fn composition(node: &str, reason: impl Into<String>) -> Self {
        Self::Composition {
            node: node.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label for the error kind, used in CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Routing { .. } => "RoutingError",
            Self::RecursionLimit { .. } => "RecursionLimitExceeded",
            Self::Composition { .. } => "CompositionError",
        }
    }
}
