use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use troupe_core::config::ModelConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::LlmClient;
use troupe_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const DEFAULT_BASE: &str = "https://api.openai.com/v1";
const COMPLETIONS_PATH: &str = "/chat/completions";

/// Completions URL for a configured base. A base that already names the
/// completions path is used as is.
fn completions_url(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or(DEFAULT_BASE).trim_end_matches('/');
    if base.ends_with(COMPLETIONS_PATH) {
        base.to_string()
    } else {
        format!("{base}{COMPLETIONS_PATH}")
    }
}

/// Streaming client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize, Debug, PartialEq)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
struct WireCall {
    id: String,
    r#type: &'static str,
    function: WireFunction,
}

#[derive(Serialize, Debug, PartialEq)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireToolSpec,
}

#[derive(Serialize)]
struct WireToolSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkCall>>,
}

#[derive(Deserialize)]
struct ChunkCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            r#type: "function",
            function: WireToolSpec {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// Flatten chat messages into the wire format. Tool results become one
/// `tool` message per result; assistant tool calls are carried on the
/// assistant message.
fn to_wire_messages(messages: Vec<ChatMessage>) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len());
    for msg in messages {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let mut results = Vec::new();
        let mut calls = Vec::new();
        for block in &msg.content {
            match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => results.push(WireMessage {
                    role: "tool",
                    content: Some(content.clone()),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(tool_use_id.clone()),
                }),
                ContentBlock::ToolUse { id, name, input } => calls.push(WireCall {
                    id: id.clone(),
                    r#type: "function",
                    function: WireFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                }),
                ContentBlock::Text { .. } => {}
            }
        }

        if !results.is_empty() {
            wire.extend(results);
            continue;
        }
        let text = msg.text();
        if calls.is_empty() {
            wire.push(WireMessage::text(role, text));
        } else {
            wire.push(WireMessage {
                role,
                content: (!text.is_empty()).then_some(text),
                tool_calls: calls,
                tool_call_id: None,
            });
        }
    }
    wire
}

fn decode_event(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return Vec::new();
    }
    let chunk: Chunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Skipping undecodable completion chunk");
            return Vec::new();
        }
    };

    let mut deltas = Vec::new();
    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            deltas.push(Ok(StreamDelta::TextDelta(text)));
        }
        // Some providers send the name and the full arguments in one chunk.
        for call in choice.delta.tool_calls.into_iter().flatten() {
            let Some(function) = call.function else { continue };
            if let Some(name) = function.name {
                deltas.push(Ok(StreamDelta::ToolUseStart {
                    index: call.index,
                    id: call.id.unwrap_or_default(),
                    name,
                }));
            }
            if let Some(args) = function.arguments.filter(|a| !a.is_empty()) {
                deltas.push(Ok(StreamDelta::ToolInputDelta {
                    index: call.index,
                    delta: args,
                }));
            }
        }
        if let Some(reason) = choice.finish_reason {
            let stop = match reason.as_str() {
                "tool_calls" | "function_call" => StopReason::ToolUse,
                "length" => StopReason::MaxTokens,
                "stop_sequence" => StopReason::StopSequence,
                _ => StopReason::EndTurn,
            };
            deltas.push(Ok(StreamDelta::Stop(stop)));
        }
    }
    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = to_wire_tools(tools);

        Box::pin(async move {
            let url = completions_url(config.base_url.as_deref());
            let body = CompletionRequest {
                model: &config.model_id,
                messages: to_wire_messages(messages),
                max_tokens: config.max_tokens,
                temperature: (config.temperature > 0.0).then_some(config.temperature),
                stream: true,
                tools,
            };
            debug!(model = %config.model_id, messages = body.messages.len(), "Sending completion request");

            let mut req = self.http.post(&url).json(&body);
            if let Some(key) = &config.api_key {
                req = req.bearer_auth(key);
            }
            let response = req
                .send()
                .await
                .map_err(|e| TroupeError::LlmRequest(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(TroupeError::LlmRequest(format!("HTTP {}: {}", status, detail)));
            }

            let deltas = SseStream::new(response.bytes_stream())
                .flat_map(|event| futures::stream::iter(decode_event(event)));
            Ok(Box::pin(deltas) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_tool_results_become_tool_messages() {
        let msgs = vec![
            ChatMessage::system("route"),
            ChatMessage {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "web_search".into(),
                    input: serde_json::json!({"query": "rust"}),
                }],
                timestamp: None,
            },
            ChatMessage {
                role: Role::User,
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".into(),
                    content: "results".into(),
                    is_error: false,
                }],
                timestamp: None,
            },
        ];
        let wire = to_wire_messages(msgs);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].role, "assistant");
        assert!(wire[1].content.is_none());
        assert_eq!(wire[1].tool_calls[0].function.name, "web_search");
        assert_eq!(wire[2].role, "tool");
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_decode_text_and_stop() {
        let deltas = decode_event(event(
            r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":"stop"}]}"#,
        ));
        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hi"));
        assert!(matches!(deltas[1], Ok(StreamDelta::Stop(StopReason::EndTurn))));
    }

    #[test]
    fn test_decode_tool_call_in_one_chunk() {
        let deltas = decode_event(event(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"route","arguments":"{\"next\":\"FINISH\"}"}}]}}]}"#,
        ));
        assert!(matches!(&deltas[0], Ok(StreamDelta::ToolUseStart { name, id, .. }) if name == "route" && id == "c1"));
        assert!(matches!(&deltas[1], Ok(StreamDelta::ToolInputDelta { delta, .. }) if delta.contains("FINISH")));
    }

    #[test]
    fn test_decode_null_tool_calls_keeps_text() {
        let deltas = decode_event(event(
            r#"{"choices":[{"delta":{"content":"hi","tool_calls":null},"finish_reason":null}]}"#,
        ));
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "hi"));
    }

    #[test]
    fn test_completions_url_appends_path_once() {
        assert_eq!(completions_url(None), "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            completions_url(Some("https://openrouter.ai/api/v1")),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(
            completions_url(Some("http://localhost:11434/v1/")),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            completions_url(Some("http://proxy.local/v1/chat/completions")),
            "http://proxy.local/v1/chat/completions"
        );
    }

    #[test]
    fn test_decode_done_and_garbage() {
        assert!(decode_event(event("[DONE]")).is_empty());
        assert!(decode_event(event("not json")).is_empty());
    }
}
