use thiserror::Error;

#[derive(Debug, Error)]
pub enum TroupeError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Artifact store errors
    #[error("Invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("Line number {line} is out of range for {file} ({len} lines)")]
    LineOutOfRange { file: String, line: usize, len: usize },

    // Capability errors
    #[error("Capability {worker} failed: {message}")]
    Capability { worker: String, message: String },

    #[error("Agent exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TroupeError>;
