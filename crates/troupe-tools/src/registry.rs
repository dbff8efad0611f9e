use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use troupe_core::config::AppConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::Tool;
use troupe_core::types::{ToolContext, ToolDefinition, ToolResult};

use crate::builtin::scrape::Scraper;
use crate::builtin::*;

/// Registry of available tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for sending to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// A registry holding only the named tools. Names that are not
    /// registered are skipped; the returned list reports them.
    pub fn select(&self, names: &[&str]) -> (Self, Vec<String>) {
        let mut subset = Self::new();
        let mut missing = Vec::new();
        for name in names {
            match self.get(name) {
                Some(tool) => subset.register_arc(tool),
                None => missing.push(name.to_string()),
            }
        }
        (subset, missing)
    }

    /// Execute a tool by name under its timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| TroupeError::ToolNotFound(name.to_string()))?;
        let secs = tool.timeout_secs();
        debug!(tool = name, worker = %ctx.worker, "Executing tool");

        tokio::time::timeout(Duration::from_secs(secs), tool.execute(input, ctx))
            .await
            .map_err(|_| TroupeError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: secs,
            })?
    }

    /// Every built-in tool the configuration enables. Document tools and the
    /// page scraper are always present; search and translation need their
    /// config sections, references need a non-empty list.
    pub fn with_builtins(config: &AppConfig) -> Result<Self> {
        let mut registry = Self::new();

        registry.register(CreateOutlineTool);
        registry.register(ReadDocumentTool);
        registry.register(WriteDocumentTool);
        registry.register(EditDocumentTool);

        let scraper = Arc::new(Scraper::new()?);
        registry.register(ScrapeWebpagesTool::new(scraper.clone()));
        if !config.references.is_empty() {
            registry.register(ScrapeReferencesTool::new(scraper, config.references.clone()));
        }

        if let Some(search) = &config.web_search {
            registry.register(WebSearchTool::from_config(search)?);
        }
        if let Some(translate) = &config.translate {
            registry.register(TranslateTool::from_config(translate));
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use troupe_test_utils::{tool_context, MemoryStore};

    use super::*;

    struct Sleepy;

    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn timeout_secs(&self) -> u64 {
            1
        }
        fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ToolResult::success("late"))
            })
        }
    }

    fn config(extra: &str) -> AppConfig {
        AppConfig::parse(&format!("{extra}\n[model]\nmodel_id = \"m\"\n")).unwrap()
    }

    #[test]
    fn test_builtins_follow_config() {
        let bare = ToolRegistry::with_builtins(&config("")).unwrap();
        assert_eq!(
            bare.list(),
            vec!["create_outline", "edit_document", "read_document", "scrape_webpages", "write_document"]
        );

        let full = ToolRegistry::with_builtins(&config(
            "references = [\"https://a\"]\n[web_search]\napi_key = \"k\"\n[translate]\napi_key = \"d\"",
        ))
        .unwrap();
        for name in ["scrape_references", "web_search", "translate"] {
            assert!(full.get(name).is_some(), "{name} missing");
        }
    }

    #[test]
    fn test_select_reports_missing() {
        let registry = ToolRegistry::with_builtins(&config("")).unwrap();
        let (subset, missing) = registry.select(&["read_document", "web_search"]);
        assert_eq!(subset.list(), vec!["read_document"]);
        assert_eq!(missing, vec!["web_search"]);
        assert_eq!(subset.definitions()[0].name, "read_document");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nope", serde_json::json!({}), tool_context(std::sync::Arc::new(MemoryStore::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, TroupeError::ToolNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Sleepy);
        let err = registry
            .execute("sleepy", serde_json::json!({}), tool_context(Arc::new(MemoryStore::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, TroupeError::ToolTimeout { timeout_secs: 1, .. }));
    }
}
