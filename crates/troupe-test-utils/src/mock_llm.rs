use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use troupe_core::config::ModelConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::LlmClient;
use troupe_core::types::*;

/// Replays scripted responses, one per `chat_stream` call, and records what
/// it was sent. Running out of script is an `LlmRequest` error.
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<Vec<StreamDelta>>>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, Vec<ToolDefinition>)>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text answer.
    pub fn with_text(self, text: &str) -> Self {
        self.push(Ok(vec![
            StreamDelta::TextDelta(text.to_string()),
            StreamDelta::Stop(StopReason::EndTurn),
        ]))
    }

    /// Queue a single tool call.
    pub fn with_tool_call(self, id: &str, name: &str, input: serde_json::Value) -> Self {
        self.push(Ok(vec![
            StreamDelta::ToolUseStart {
                index: 0,
                id: id.to_string(),
                name: name.to_string(),
            },
            StreamDelta::ToolInputDelta {
                index: 0,
                delta: input.to_string(),
            },
            StreamDelta::Stop(StopReason::ToolUse),
        ]))
    }

    /// Queue a request failure.
    pub fn with_error(self, message: &str) -> Self {
        self.push(Err(TroupeError::LlmRequest(message.to_string())))
    }

    fn push(self, item: Result<Vec<StreamDelta>>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    /// Messages and tools of every call so far.
    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, Vec<ToolDefinition>)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((messages, tools.to_vec()));
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        Box::pin(async move {
            let deltas = next.unwrap_or_else(|| Err(TroupeError::LlmRequest("mock script exhausted".into())))?;
            let items: Vec<Result<StreamDelta>> = deltas.into_iter().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
