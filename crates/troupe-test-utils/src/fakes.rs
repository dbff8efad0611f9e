use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use troupe_core::error::{Result, TroupeError};
use troupe_core::state::State;
use troupe_core::traits::{Capability, RoutingPolicy};
use troupe_core::types::Decision;

/// A capability with canned replies. Records every input it receives.
pub struct FakeCapability {
    reply: std::result::Result<String, String>,
    inputs: Mutex<Vec<serde_json::Value>>,
}

impl FakeCapability {
    /// Always succeeds with `text`.
    pub fn replying(text: &str) -> Self {
        Self::with(Ok(text.to_string()))
    }

    /// Always fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self::with(Err(reason.to_string()))
    }

    fn with(reply: std::result::Result<String, String>) -> Self {
        Self {
            reply,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<serde_json::Value> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.inputs.lock().map(|i| i.len()).unwrap_or_default()
    }
}

impl Capability for FakeCapability {
    fn invoke(&self, input: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(input);
        }
        let reply = self.reply.clone();
        Box::pin(async move {
            reply.map_err(|message| TroupeError::Capability {
                worker: "fake".into(),
                message,
            })
        })
    }
}

/// Returns a fixed sequence of routing keys (`"FINISH"` ends the team).
/// Running out of keys, or an `Err` entry, is a policy failure.
pub struct ScriptedPolicy {
    keys: Mutex<VecDeque<std::result::Result<String, String>>>,
    seen: Mutex<Vec<State>>,
}

impl ScriptedPolicy {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(keys.into_iter().map(|k| Ok(k.into())).collect())
    }

    pub fn from_results(keys: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            keys: Mutex::new(keys.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// States the policy was consulted with, in order.
    pub fn seen(&self) -> Vec<State> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl RoutingPolicy for ScriptedPolicy {
    fn decide<'a>(&'a self, state: &'a State, _roster: &'a [String]) -> BoxFuture<'a, Result<Decision>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(state.clone());
        }
        let next = self
            .keys
            .lock()
            .ok()
            .and_then(|mut k| k.pop_front())
            .unwrap_or_else(|| Err("routing script exhausted".to_string()));
        Box::pin(async move {
            next.map(|key| Decision::parse(&key))
                .map_err(|e| TroupeError::LlmRequest(e))
        })
    }
}
