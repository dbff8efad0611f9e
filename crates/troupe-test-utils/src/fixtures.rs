use std::sync::Arc;

use troupe_core::config::AppConfig;
use troupe_core::traits::ArtifactStore;
use troupe_core::types::ToolContext;

/// Tool context for a test worker backed by `store`.
pub fn tool_context(store: Arc<dyn ArtifactStore>) -> ToolContext {
    ToolContext {
        worker: "TestWorker".to_string(),
        store: Some(store),
    }
}

/// Minimal valid configuration: a model entry and every default.
pub fn test_config() -> AppConfig {
    match AppConfig::parse("[model]\nprovider = \"openai\"\nmodel_id = \"mock-model\"\n") {
        Ok(config) => config,
        Err(e) => panic!("test config does not parse: {e}"),
    }
}
