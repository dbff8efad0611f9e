//! Persistence tools over the run's [`ArtifactStore`].
//!
//! Store-level failures (bad names, out-of-range inserts, missing files) are
//! reported to the model as error results rather than failing the call, so
//! the model can correct itself on its next turn.
//!
//! [`ArtifactStore`]: troupe_core::traits::ArtifactStore

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::Tool;
use troupe_core::types::{LineRange, ToolContext, ToolResult};

use super::store_of;

fn parse<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| TroupeError::ToolValidation(e.to_string()))
}

/// Render outline points as a numbered list, one per line.
pub fn render_outline(points: &[String]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}\n", i + 1, p))
        .collect()
}

pub struct CreateOutlineTool;

#[derive(Deserialize)]
struct OutlineInput {
    points: Vec<String>,
    file_name: String,
}

impl Tool for CreateOutlineTool {
    fn name(&self) -> &str {
        "create_outline"
    }

    fn description(&self) -> &str {
        "Create and save an outline as a numbered list of main points or sections."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "points": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of main points or sections."
                },
                "file_name": {
                    "type": "string",
                    "description": "File path to save the outline."
                }
            },
            "required": ["points", "file_name"]
        })
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: OutlineInput = parse(input)?;
            let store = store_of(self.name(), &ctx)?;
            let body = render_outline(&params.points);
            Ok(match store.write(&params.file_name, &body).await {
                Ok(()) => ToolResult::success(format!("Outline saved to {}", params.file_name)),
                Err(e) => ToolResult::error(e.to_string()),
            })
        })
    }
}

pub struct ReadDocumentTool;

#[derive(Deserialize)]
struct ReadInput {
    file_name: String,
    #[serde(default)]
    start: Option<usize>,
    #[serde(default)]
    end: Option<usize>,
}

impl Tool for ReadDocumentTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read the specified document, optionally restricted to lines [start, end)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": { "type": "string", "description": "Document to read." },
                "start": { "type": "integer", "description": "First line, 0-indexed. Default 0." },
                "end": { "type": "integer", "description": "Line to stop before. Default: end of document." }
            },
            "required": ["file_name"]
        })
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: ReadInput = parse(input)?;
            let store = store_of(self.name(), &ctx)?;
            let range = LineRange::new(params.start, params.end);
            Ok(match store.read(&params.file_name, range).await {
                Ok(text) => ToolResult::success(text),
                Err(e) => ToolResult::error(e.to_string()),
            })
        })
    }
}

pub struct WriteDocumentTool;

#[derive(Deserialize)]
struct WriteInput {
    content: String,
    file_name: String,
}

impl Tool for WriteDocumentTool {
    fn name(&self) -> &str {
        "write_document"
    }

    fn description(&self) -> &str {
        "Create and save a text document, replacing any existing one with the same name."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Text content to be written into the document." },
                "file_name": { "type": "string", "description": "File path to save the document." }
            },
            "required": ["content", "file_name"]
        })
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: WriteInput = parse(input)?;
            let store = store_of(self.name(), &ctx)?;
            debug!(worker = %ctx.worker, file = %params.file_name, "write_document");
            Ok(match store.write(&params.file_name, &params.content).await {
                Ok(()) => ToolResult::success(format!("Document saved to {}", params.file_name)),
                Err(e) => ToolResult::error(e.to_string()),
            })
        })
    }
}

pub struct EditDocumentTool;

#[derive(Deserialize)]
struct EditInput {
    file_name: String,
    inserts: BTreeMap<usize, String>,
}

impl Tool for EditDocumentTool {
    fn name(&self) -> &str {
        "edit_document"
    }

    fn description(&self) -> &str {
        "Edit a document by inserting text at specific line numbers."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": { "type": "string", "description": "Path of the document to be edited." },
                "inserts": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Map from 1-indexed line number to the text inserted at that line."
                }
            },
            "required": ["file_name", "inserts"]
        })
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: EditInput = parse(input)?;
            let store = store_of(self.name(), &ctx)?;
            Ok(match store.edit(&params.file_name, params.inserts).await {
                Ok(()) => ToolResult::success(format!("Document edited and saved to {}", params.file_name)),
                Err(e) => ToolResult::error(format!("Error: {}", e)),
            })
        })
    }
}
