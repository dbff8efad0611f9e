use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use troupe_core::config::WebSearchConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::Tool;
use troupe_core::types::{ToolContext, ToolResult};

use super::exec_error;

const TAVILY_URL: &str = "https://api.tavily.com/search";
const GOOGLE_URL: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Debug, Clone, PartialEq)]
enum Provider {
    Tavily { api_key: String },
    Google { api_key: String, engine_id: String },
}

/// A single normalized search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

pub struct WebSearchTool {
    provider: Provider,
    max_results: usize,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
}

impl WebSearchTool {
    pub fn from_config(config: &WebSearchConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "tavily" => Provider::Tavily {
                api_key: config.api_key.clone(),
            },
            "google" => Provider::Google {
                api_key: config.api_key.clone(),
                engine_id: config.engine_id.clone().ok_or_else(|| {
                    TroupeError::Config("web_search.engine_id is required for google".into())
                })?,
            },
            other => {
                return Err(TroupeError::Config(format!(
                    "unknown web_search provider '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            provider,
            max_results: config.max_results,
            http: reqwest::Client::new(),
        })
    }

    async fn query(&self, query: &str, max: usize) -> Result<Vec<SearchHit>> {
        // Custom Search caps `num` at 10.
        let num = max.min(10).to_string();
        let request = match &self.provider {
            Provider::Tavily { api_key } => self.http.post(TAVILY_URL).json(&json!({
                "api_key": api_key,
                "query": query,
                "max_results": max,
            })),
            Provider::Google { api_key, engine_id } => self.http.get(GOOGLE_URL).query(&[
                ("key", api_key.as_str()),
                ("cx", engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ]),
        };
        let resp = request.send().await.map_err(|e| exec_error("web_search", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(exec_error("web_search", format!("HTTP {}", status)));
        }
        let body: Value = resp.json().await.map_err(|e| exec_error("web_search", e))?;
        Ok(match self.provider {
            Provider::Tavily { .. } => parse_hits(&body["results"], "content", "url"),
            Provider::Google { .. } => parse_hits(&body["items"], "snippet", "link"),
        })
    }
}

fn parse_hits(items: &Value, snippet_key: &str, url_key: &str) -> Vec<SearchHit> {
    let field = |item: &Value, key: &str| item[key].as_str().unwrap_or_default().to_string();
    items
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|item| SearchHit {
                    title: field(item, "title"),
                    snippet: field(item, snippet_key),
                    url: field(item, url_key),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".into();
    }
    hits.iter()
        .map(|h| format!("**{}**\n{}\nURL: {}", h.title, h.snippet, h.url))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for recent results. Returns titles, snippets and URLs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results",
                    "default": self.max_results
                }
            },
            "required": ["query"]
        })
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: SearchInput = serde_json::from_value(input)
                .map_err(|e| TroupeError::ToolValidation(e.to_string()))?;
            let max = params.max_results.unwrap_or(self.max_results).max(1);
            debug!(query = %params.query, max, "web_search");
            let hits = self.query(&params.query, max).await?;
            Ok(ToolResult::success(render_hits(&hits)))
        })
    }
}
