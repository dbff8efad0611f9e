use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TroupeError};
use crate::state::{Message, State};

/// Routing key a supervisor emits when its team is done.
pub const FINISH: &str = "FINISH";

/// Identifies one graph execution in logs. Nested subgraph runs get their
/// own id.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single content block in a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message sent to or received from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Convert a transcript entry. Messages from other workers are passed as
    /// user turns prefixed with their author so provenance survives.
    pub fn from_transcript(message: &Message) -> Self {
        if message.author() == crate::state::USER {
            Self::user(message.content())
        } else {
            Self::user(format!("[{}]: {}", message.author(), message.content()))
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool use blocks from this message.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
                _ => None,
            })
            .collect()
    }
}

/// Stop reason from the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the model.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool use block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool use input JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition for sending to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Worker on whose behalf the tool runs.
    pub worker: String,
    pub store: Option<Arc<dyn crate::traits::ArtifactStore>>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("worker", &self.worker)
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// A supervisor's routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Hand the turn to the named roster member.
    Route(String),
    /// The team is done.
    Finish,
}

impl Decision {
    /// Parse a routing key; `FINISH` (any case) ends the team.
    pub fn parse(key: &str) -> Self {
        let key = key.trim();
        if key.eq_ignore_ascii_case(FINISH) {
            Decision::Finish
        } else {
            Decision::Route(key.to_string())
        }
    }

    /// The value written to the `next` state field.
    pub fn as_key(&self) -> &str {
        match self {
            Decision::Route(name) => name,
            Decision::Finish => FINISH,
        }
    }
}

/// Structured arguments a worker hands to its capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInput {
    pub worker: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub team_members: Vec<String>,
    #[serde(default)]
    pub current_files: Option<String>,
}

impl WorkerInput {
    pub fn from_state(worker: &str, state: &State) -> Self {
        Self {
            worker: worker.to_string(),
            messages: state.messages.clone(),
            team_members: state.team_members.clone(),
            current_files: state.current_files.clone(),
        }
    }
}

/// Half-open `[start, end)` line window, 0-indexed. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl LineRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<usize>, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// Clamp to a document of `len` lines, returning slice bounds.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let end = self.end.unwrap_or(len).min(len);
        let start = self.start.unwrap_or(0).min(end);
        (start, end)
    }
}

/// The lines of `content` selected by `range`, joined with `\n`.
pub fn slice_lines(content: &str, range: LineRange) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = range.bounds(lines.len());
    lines[start..end].join("\n")
}

/// Insert lines at 1-indexed positions, ascending, each against the already
/// edited document. A position may be at most one past the current end.
/// Fails without partial effect if any position is out of range.
pub fn insert_lines(name: &str, content: &str, inserts: BTreeMap<usize, String>) -> Result<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    for (line, text) in inserts {
        if line == 0 || line > lines.len() + 1 {
            return Err(TroupeError::LineOutOfRange {
                file: name.to_string(),
                line,
                len: lines.len(),
            });
        }
        lines.insert(line - 1, text);
    }
    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}
