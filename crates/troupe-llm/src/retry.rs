use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use troupe_core::config::{ModelConfig, RetryConfig};
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::LlmClient;
use troupe_core::types::*;

/// Wraps a primary client with bounded retries and an ordered list of
/// fallback models tried once each after the primary gives up.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    policy: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        policy: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            policy,
        }
    }
}

/// Transport-level failures worth another attempt.
fn is_transient(e: &TroupeError) -> bool {
    const MARKERS: [&str; 7] = ["429", "500", "502", "503", "504", "timed out", "connection"];
    match e {
        TroupeError::LlmRequest(msg) => {
            let msg = msg.to_ascii_lowercase();
            MARKERS.iter().any(|m| msg.contains(m))
        }
        TroupeError::LlmStream(_) => true,
        _ => false,
    }
}

/// Exponential backoff capped at `max_backoff_ms`, with ±20% jitter.
fn backoff(attempt: u32, policy: &RetryConfig) -> Duration {
    let base = policy
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(20))
        .min(policy.max_backoff_ms);
    let jitter = rand::random::<f64>() * 0.4 + 0.8;
    Duration::from_millis((base as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let mut attempt = 0;
            let last_err = loop {
                match self.primary.chat_stream(&config, messages.clone(), &tools).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_transient(&e) && attempt < self.policy.max_retries => {
                        let wait = backoff(attempt, &self.policy);
                        attempt += 1;
                        warn!(
                            attempt,
                            max_retries = self.policy.max_retries,
                            backoff_ms = wait.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    Err(e) => break e,
                }
            };

            for (fallback, client) in &self.fallbacks {
                match client.chat_stream(fallback, messages.clone(), &tools).await {
                    Ok(stream) => {
                        info!(model = %fallback.model_id, "Using fallback model");
                        return Ok(stream);
                    }
                    Err(e) => warn!(model = %fallback.model_id, error = %e, "Fallback model failed"),
                }
            }
            Err(last_err)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::StreamExt;

    use super::*;

    /// Fails with the given error `failures` times, then streams one text delta.
    struct Flaky {
        failures: usize,
        error: fn() -> TroupeError,
        calls: Arc<AtomicUsize>,
    }

    impl LlmClient for Flaky {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
            _tools: &[ToolDefinition],
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n < self.failures {
                    return Err((self.error)());
                }
                let items = vec![Ok(StreamDelta::TextDelta("ok".into()))];
                Ok(Box::pin(futures::stream::iter(items)) as BoxStream<'_, _>)
            })
        }
    }

    fn model(id: &str) -> ModelConfig {
        serde_json::from_value(serde_json::json!({ "model_id": id })).unwrap()
    }

    fn fast_policy(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&TroupeError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_transient(&TroupeError::LlmStream("reset".into())));
        assert!(!is_transient(&TroupeError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_transient(&TroupeError::Config("x".into())));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = backoff(9, &policy);
        assert!(d <= Duration::from_millis(4800));
        assert!(d >= Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: 2,
                error: || TroupeError::LlmRequest("HTTP 503".into()),
                calls: calls.clone(),
            }),
            vec![],
            fast_policy(3),
        );
        let mut stream = client.chat_stream(&model("m"), vec![], &[]).await.unwrap();
        assert!(matches!(stream.next().await, Some(Ok(StreamDelta::TextDelta(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_goes_to_fallback() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: usize::MAX,
                error: || TroupeError::LlmRequest("HTTP 401".into()),
                calls: primary_calls.clone(),
            }),
            vec![(
                model("backup"),
                Box::new(Flaky {
                    failures: 0,
                    error: || TroupeError::LlmRequest("unused".into()),
                    calls: fallback_calls.clone(),
                }) as Box<dyn LlmClient>,
            )],
            fast_policy(3),
        );
        assert!(client.chat_stream(&model("m"), vec![], &[]).await.is_ok());
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: usize::MAX,
                error: || TroupeError::LlmRequest("HTTP 502".into()),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            vec![],
            fast_policy(1),
        );
        let err = client.chat_stream(&model("m"), vec![], &[]).await.err().unwrap();
        assert!(err.to_string().contains("502"));
    }
}
