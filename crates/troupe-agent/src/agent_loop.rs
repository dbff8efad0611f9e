use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use troupe_core::config::ModelConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::{ArtifactStore, Capability, LlmClient};
use troupe_core::types::*;
use troupe_tools::ToolRegistry;

/// Accumulator for streaming tool call deltas.
#[derive(Debug, Default, Clone)]
pub(crate) struct ToolCallAccumulator {
    pub id: String,
    pub name: String,
    pub input_json: String,
}

impl ToolCallAccumulator {
    pub fn input(&self) -> serde_json::Value {
        serde_json::from_str(&self.input_json).unwrap_or(serde_json::Value::Null)
    }
}

/// One fully drained model response.
#[derive(Debug, Default)]
pub(crate) struct Response {
    pub text: String,
    pub tool_calls: Vec<ToolCallAccumulator>,
    pub stop_reason: Option<StopReason>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Response {
    pub async fn collect(mut stream: BoxStream<'_, Result<StreamDelta>>) -> Result<Self> {
        let mut response = Self::default();
        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(text) => response.text.push_str(&text),
                StreamDelta::ToolUseStart { index, id, name } => {
                    while response.tool_calls.len() <= index {
                        response.tool_calls.push(ToolCallAccumulator::default());
                    }
                    response.tool_calls[index].id = id;
                    response.tool_calls[index].name = name;
                }
                StreamDelta::ToolInputDelta { index, delta } => {
                    if let Some(tc) = response.tool_calls.get_mut(index) {
                        tc.input_json.push_str(&delta);
                    }
                }
                StreamDelta::Stop(reason) => response.stop_reason = Some(reason),
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    response.input_tokens += input_tokens;
                    response.output_tokens += output_tokens;
                }
            }
        }
        Ok(response)
    }

    fn assistant_message(&self) -> ChatMessage {
        let mut content = Vec::new();
        if !self.text.is_empty() {
            content.push(ContentBlock::Text {
                text: self.text.clone(),
            });
        }
        for tc in &self.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: tc.input(),
            });
        }
        ChatMessage {
            role: Role::Assistant,
            content,
            timestamp: Some(chrono::Utc::now()),
        }
    }
}

/// Fill `{current_files}` and `{team_members}` in a prompt template.
pub fn render_prompt(template: &str, input: &WorkerInput) -> String {
    template
        .replace(
            "{current_files}",
            input.current_files.as_deref().unwrap_or_default(),
        )
        .replace("{team_members}", &input.team_members.join(", "))
}

/// LLM-backed capability: a bounded tool-calling loop over a fixed tool set.
pub struct ToolAgent {
    name: String,
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    tools: ToolRegistry,
    system_prompt: String,
    max_turns: usize,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl ToolAgent {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        tools: ToolRegistry,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            llm,
            model,
            tools,
            system_prompt: system_prompt.into(),
            max_turns: 10,
            store: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Artifact store handed to the document tools.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.list()
    }

    /// Run the loop for one worker invocation and return the final text.
    pub async fn run(&self, input: WorkerInput) -> Result<String> {
        let mut messages = vec![ChatMessage::system(render_prompt(&self.system_prompt, &input))];
        messages.extend(input.messages.iter().map(ChatMessage::from_transcript));

        let tool_defs = self.tools.definitions();
        let ctx = ToolContext {
            worker: self.name.clone(),
            store: self.store.clone(),
        };

        let mut total_input_tokens = 0u64;
        let mut total_output_tokens = 0u64;

        for turn in 0..self.max_turns {
            debug!(agent = %self.name, turn, "Starting agent turn");

            let stream = self
                .llm
                .chat_stream(&self.model, messages.clone(), &tool_defs)
                .await?;
            let response = Response::collect(stream).await?;
            total_input_tokens += response.input_tokens;
            total_output_tokens += response.output_tokens;
            messages.push(response.assistant_message());

            if response.tool_calls.is_empty() {
                if response.stop_reason == Some(StopReason::MaxTokens) {
                    warn!(agent = %self.name, "LLM hit max tokens");
                }
                info!(
                    agent = %self.name,
                    turns = turn + 1,
                    input_tokens = total_input_tokens,
                    output_tokens = total_output_tokens,
                    "Agent run complete"
                );
                return Ok(response.text);
            }

            let mut results = Vec::with_capacity(response.tool_calls.len());
            for tc in &response.tool_calls {
                let result = match self.tools.execute(&tc.name, tc.input(), ctx.clone()).await {
                    Ok(r) => r,
                    Err(e) => {
                        error!(agent = %self.name, tool = %tc.name, error = %e, "Tool execution failed");
                        ToolResult::error(e.to_string())
                    }
                };
                results.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id.clone(),
                    content: result.content,
                    is_error: result.is_error,
                });
            }
            messages.push(ChatMessage {
                role: Role::User,
                content: results,
                timestamp: Some(chrono::Utc::now()),
            });
        }

        Err(TroupeError::MaxTurnsExceeded(self.max_turns))
    }
}

impl Capability for ToolAgent {
    fn invoke(&self, input: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let input: WorkerInput = serde_json::from_value(input)?;
            self.run(input).await
        })
    }
}
