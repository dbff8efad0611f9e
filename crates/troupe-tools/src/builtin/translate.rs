use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use troupe_core::config::TranslateConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::Tool;
use troupe_core::types::{ToolContext, ToolResult};

use super::exec_error;

/// Machine translation through the DeepL HTTP API.
pub struct TranslateTool {
    api_key: String,
    target_lang: String,
    url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TranslateInput {
    text: String,
    #[serde(default)]
    target_lang: Option<String>,
}

#[derive(Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Deserialize)]
struct DeeplTranslation {
    text: String,
}

impl TranslateTool {
    pub fn from_config(config: &TranslateConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            target_lang: config.target_lang.clone(),
            url: config.base_url.clone(),
            http: reqwest::Client::new(),
        }
    }
}

fn join_translations(resp: DeeplResponse) -> Result<String> {
    if resp.translations.is_empty() {
        return Err(exec_error("translate", "empty translation response"));
    }
    Ok(resp
        .translations
        .into_iter()
        .map(|t| t.text)
        .collect::<Vec<_>>()
        .join("\n"))
}

impl Tool for TranslateTool {
    fn name(&self) -> &str {
        "translate"
    }

    fn description(&self) -> &str {
        "Translate text into the configured target language."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The text to translate." },
                "target_lang": {
                    "type": "string",
                    "description": format!("Target language code (default {})", self.target_lang)
                }
            },
            "required": ["text"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        60
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: TranslateInput = serde_json::from_value(input)
                .map_err(|e| TroupeError::ToolValidation(e.to_string()))?;
            let target = params.target_lang.unwrap_or_else(|| self.target_lang.clone());
            debug!(target_lang = %target, chars = params.text.len(), "translate");

            let resp = self
                .http
                .post(&self.url)
                .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
                .form(&[("text", params.text.as_str()), ("target_lang", target.as_str())])
                .send()
                .await
                .map_err(|e| exec_error("translate", e))?;
            let status = resp.status();
            if !status.is_success() {
                let detail = resp.text().await.unwrap_or_default();
                return Err(exec_error("translate", format!("HTTP {}: {}", status, detail)));
            }
            let body: DeeplResponse = resp.json().await.map_err(|e| exec_error("translate", e))?;
            Ok(ToolResult::success(join_translations(body)?))
        })
    }
}
