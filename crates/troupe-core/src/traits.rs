use std::collections::BTreeMap;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::state::State;
use crate::types::*;

/// Streaming chat-completions client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// A callable tool exposed to the model.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// The external work a worker node performs.
///
/// Receives the serialized [`WorkerInput`] and returns the text that becomes
/// the worker's single transcript message.
pub trait Capability: Send + Sync + 'static {
    fn invoke(&self, input: serde_json::Value) -> BoxFuture<'_, Result<String>>;
}

/// Chooses the next hop for a supervisor.
pub trait RoutingPolicy: Send + Sync + 'static {
    fn decide<'a>(&'a self, state: &'a State, roster: &'a [String]) -> BoxFuture<'a, Result<Decision>>;
}

/// Read-only pre-processing step run before a worker's capability.
pub trait Prelude: Send + Sync + 'static {
    fn prepare(&self, state: State) -> BoxFuture<'_, State>;
}

/// Flat, name-addressed document storage shared by the persistence tools.
pub trait ArtifactStore: Send + Sync + 'static {
    /// Names of stored documents, sorted.
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Read a document, restricted to `range`.
    fn read(&self, name: &str, range: LineRange) -> BoxFuture<'_, Result<String>>;

    /// Create or replace a document.
    fn write(&self, name: &str, content: &str) -> BoxFuture<'_, Result<()>>;

    /// Insert lines at 1-indexed positions. Inserts are applied in ascending
    /// line order against the progressively edited document.
    fn edit(&self, name: &str, inserts: BTreeMap<usize, String>) -> BoxFuture<'_, Result<()>>;
}
