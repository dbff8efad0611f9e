//! Supervised state graphs.
//!
//! A graph is a set of named [`Node`]s joined by [`Edge`]s and compiled
//! into an immutable [`CompiledGraph`]. Running it produces an
//! [`Execution`]: a lazy sequence of [`Snapshot`]s, one per node hop, that
//! ends at the terminal sentinel, at the first fatal [`GraphError`], or when
//! the step budget runs out.
//!
//! Supervisors route between workers by writing `next` into the shared
//! state. A [`Subgraph`] mounts a whole compiled graph as one node.

pub mod builder;
pub mod compiled;
pub mod edge;
pub mod error;
pub mod executor;
pub mod node;
pub mod subgraph;
pub mod supervisor;
pub mod worker;

pub use builder::GraphBuilder;
pub use compiled::CompiledGraph;
pub use edge::{route_on_next, Edge, Target, TERMINAL};
pub use error::{CompileError, GraphError};
pub use executor::{Execution, Snapshot};
pub use node::{Node, NodeAction, NodeKind};
pub use subgraph::Subgraph;
pub use supervisor::{FnPolicy, Supervisor};
pub use worker::{CurrentFilesPrelude, Worker, WorkerKind};
