pub mod agent_loop;
pub mod graph;
pub mod router;

pub use agent_loop::{render_prompt, ToolAgent};
pub use graph::{
    CompileError, CompiledGraph, CurrentFilesPrelude, Execution, FnPolicy, GraphBuilder,
    GraphError, Snapshot, Subgraph, Supervisor, Target, Worker, WorkerKind, TERMINAL,
};
pub use router::{LlmRouter, SUPERVISOR_PROMPT};
