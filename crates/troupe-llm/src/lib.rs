pub mod openai;
pub mod retry;
pub mod streaming;

use troupe_core::config::AppConfig;
use troupe_core::config::ModelConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::LlmClient;

pub use openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for a single model entry.
///
/// Every provider troupe talks to speaks the OpenAI chat-completions
/// protocol; anything else is rejected up front.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "ollama" | "groq" | "openrouter" | "vllm" | "compatible" => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(TroupeError::UnsupportedProvider(other.to_string())),
    }
}

/// Build the primary client wrapped with retry and configured fallbacks.
pub fn client_from_config(config: &AppConfig) -> Result<RetryingClient> {
    let primary = create_client(&config.model)?;
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|m| create_client(m).map(|c| (m.clone(), c)))
        .collect::<Result<Vec<_>>>()?;
    let retry = config.model.retry.clone().unwrap_or_default();
    Ok(RetryingClient::new(primary, fallbacks, retry))
}
