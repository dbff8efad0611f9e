use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use troupe_core::config::ModelConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::state::State;
use troupe_core::traits::{LlmClient, RoutingPolicy};
use troupe_core::types::{ChatMessage, Decision, ToolDefinition, FINISH};

use crate::agent_loop::Response;

/// Name of the function tool the model answers through.
pub const ROUTE_TOOL: &str = "route";

/// Default supervisor prompt. `{team_members}` is replaced by the roster.
pub const SUPERVISOR_PROMPT: &str = "You are a supervisor tasked with managing a conversation between the \
following workers: {team_members}. Given the following user request, respond with the worker to act next. \
Each worker will perform a task and respond with their results and status. When finished, respond with FINISH.";

/// Model-driven routing policy.
///
/// The model sees the prompt, the transcript, and a closing instruction, and
/// answers by calling [`ROUTE_TOOL`]. A bare member name in plain text is
/// accepted too. Whatever it picks is validated by the owning supervisor.
pub struct LlmRouter {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    system_prompt: String,
}

impl LlmRouter {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self {
            llm,
            model,
            system_prompt: SUPERVISOR_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn options(roster: &[String]) -> Vec<String> {
        std::iter::once(FINISH.to_string())
            .chain(roster.iter().cloned())
            .collect()
    }

    pub fn route_tool(roster: &[String]) -> ToolDefinition {
        ToolDefinition {
            name: ROUTE_TOOL.to_string(),
            description: "Select the next role.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "next": {
                        "title": "Next",
                        "type": "string",
                        "enum": Self::options(roster),
                    }
                },
                "required": ["next"]
            }),
        }
    }

    fn messages(&self, state: &State, roster: &[String]) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(
            self.system_prompt.replace("{team_members}", &roster.join(", ")),
        )];
        messages.extend(state.messages.iter().map(ChatMessage::from_transcript));
        messages.push(ChatMessage::system(format!(
            "Given the conversation above, who should act next? Or should we FINISH? Select one of: {}",
            Self::options(roster).join(", ")
        )));
        messages
    }
}

/// Pull a routing key out of a model response.
pub(crate) fn read_decision(response: &Response, roster: &[String]) -> Result<Decision> {
    if let Some(call) = response.tool_calls.iter().find(|tc| tc.name == ROUTE_TOOL) {
        return call
            .input()
            .get("next")
            .and_then(|v| v.as_str())
            .map(Decision::parse)
            .ok_or_else(|| {
                TroupeError::LlmParse(format!("route call without 'next': {}", call.input_json))
            });
    }

    let text = response.text.trim().trim_matches(|c: char| c == '"' || c == '.');
    if !text.is_empty() {
        let exact = LlmRouter::options(roster)
            .into_iter()
            .find(|o| o.eq_ignore_ascii_case(text));
        if let Some(key) = exact {
            return Ok(Decision::parse(&key));
        }
        let mentioned: Vec<String> = LlmRouter::options(roster)
            .into_iter()
            .filter(|o| text.contains(o.as_str()))
            .collect();
        if let [only] = mentioned.as_slice() {
            return Ok(Decision::parse(only));
        }
    }
    Err(TroupeError::LlmParse(format!(
        "router answer names no option: {:?}",
        response.text
    )))
}

impl RoutingPolicy for LlmRouter {
    fn decide<'a>(&'a self, state: &'a State, roster: &'a [String]) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(async move {
            let tools = [Self::route_tool(roster)];
            let stream = self
                .llm
                .chat_stream(&self.model, self.messages(state, roster), &tools)
                .await?;
            let response = Response::collect(stream).await?;
            let decision = read_decision(&response, roster)?;
            debug!(next = decision.as_key(), "Router answered");
            Ok(decision)
        })
    }
}
