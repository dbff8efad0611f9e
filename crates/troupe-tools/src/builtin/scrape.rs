use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::Tool;
use troupe_core::types::{ToolContext, ToolResult};

use super::exec_error;

/// Turns fetched HTML into plain text plus a page title.
pub struct PageCleaner {
    title: Regex,
    script: Regex,
    style: Regex,
    tags: Regex,
    blank_lines: Regex,
}

impl PageCleaner {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| TroupeError::Config(format!("bad pattern {pattern}: {e}")))
        };
        Ok(Self {
            title: compile(r"(?is)<title[^>]*>(.*?)</title>")?,
            script: compile(r"(?is)<script[^>]*>.*?</script>")?,
            style: compile(r"(?is)<style[^>]*>.*?</style>")?,
            tags: compile(r"<[^>]+>")?,
            blank_lines: compile(r"\n\s*\n(\s*\n)+")?,
        })
    }

    pub fn title(&self, html: &str) -> Option<String> {
        self.title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|t| !t.is_empty())
    }

    pub fn text(&self, html: &str) -> String {
        let text = self.script.replace_all(html, "");
        let text = self.style.replace_all(&text, "");
        let text = self.tags.replace_all(&text, "");
        let text = decode_entities(&text);
        self.blank_lines.replace_all(&text, "\n\n").trim().to_string()
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Wrap one page the way downstream prompts expect it.
pub fn document_block(title: &str, body: &str) -> String {
    format!("<Document name=\"{}\">\n{}\n</Document>", title, body)
}

/// Fetches pages and renders them as `<Document>` blocks joined by blank
/// lines. A page that fails to load is rendered as a block whose body is the
/// error, so one dead link does not discard the rest.
pub struct Scraper {
    http: reqwest::Client,
    cleaner: PageCleaner,
}

impl Scraper {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("troupe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TroupeError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            cleaner: PageCleaner::new()?,
        })
    }

    async fn fetch(&self, url: &str) -> std::result::Result<(String, String), String> {
        let resp = self.http.get(url).send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let html = resp.text().await.map_err(|e| e.to_string())?;
        let title = self.cleaner.title(&html).unwrap_or_default();
        Ok((title, self.cleaner.text(&html)))
    }

    pub async fn scrape(&self, urls: &[String]) -> String {
        let mut blocks = Vec::with_capacity(urls.len());
        for url in urls {
            debug!(%url, "Scraping page");
            let block = match self.fetch(url).await {
                Ok((title, body)) => document_block(&title, &body),
                Err(e) => {
                    warn!(%url, error = %e, "Page fetch failed");
                    document_block(url, &format!("Error: {}", e))
                }
            };
            blocks.push(block);
        }
        blocks.join("\n\n")
    }
}

/// Accept a URL list, a JSON-encoded URL list, or a single URL string.
pub fn normalize_urls(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| TroupeError::ToolValidation("urls must be strings".into()))
            })
            .collect(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner @ Value::Array(_)) => normalize_urls(&inner),
            _ => Ok(vec![s.clone()]),
        },
        _ => Err(TroupeError::ToolValidation(
            "urls must be a list of strings or a JSON string representing a list of URLs".into(),
        )),
    }
}

pub struct ScrapeWebpagesTool {
    scraper: Arc<Scraper>,
}

impl ScrapeWebpagesTool {
    pub fn new(scraper: Arc<Scraper>) -> Self {
        Self { scraper }
    }
}

impl Tool for ScrapeWebpagesTool {
    fn name(&self) -> &str {
        "scrape_webpages"
    }

    fn description(&self) -> &str {
        "Scrape the provided web pages for detailed information."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs to fetch"
                }
            },
            "required": ["urls"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        120
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let urls = normalize_urls(&input["urls"])?;
            if urls.is_empty() {
                return Err(TroupeError::ToolValidation("urls must not be empty".into()));
            }
            Ok(ToolResult::success(self.scraper.scrape(&urls).await))
        })
    }
}

/// Scrapes the fixed reference list from configuration; the model cannot
/// choose the URLs.
pub struct ScrapeReferencesTool {
    scraper: Arc<Scraper>,
    references: Vec<String>,
}

impl ScrapeReferencesTool {
    pub fn new(scraper: Arc<Scraper>, references: Vec<String>) -> Self {
        Self { scraper, references }
    }
}

impl Tool for ScrapeReferencesTool {
    fn name(&self) -> &str {
        "scrape_references"
    }

    fn description(&self) -> &str {
        "Scrape the predefined reference pages for detailed information."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn timeout_secs(&self) -> u64 {
        120
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            if self.references.is_empty() {
                return Err(exec_error(self.name(), "no references configured"));
            }
            Ok(ToolResult::success(self.scraper.scrape(&self.references).await))
        })
    }
}
