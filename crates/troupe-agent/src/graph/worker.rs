use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use troupe_core::state::{Message, State, StateUpdate};
use troupe_core::traits::{ArtifactStore, Capability, Prelude};
use troupe_core::types::WorkerInput;

use super::error::GraphError;
use super::node::NodeAction;

/// What a worker is for. Each kind names a default tool set and prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Search,
    Scrape,
    Translate,
    Persist,
}

impl WorkerKind {
    pub fn default_tools(self) -> &'static [&'static str] {
        match self {
            Self::Search => &["web_search"],
            Self::Scrape => &["scrape_webpages", "scrape_references"],
            Self::Translate => &["translate"],
            Self::Persist => &[
                "create_outline",
                "read_document",
                "write_document",
                "edit_document",
            ],
        }
    }

    pub fn default_prompt(self) -> &'static str {
        match self {
            Self::Search => {
                "You are a research assistant who can search for up-to-date info using the search engine."
            }
            Self::Scrape => {
                "You are a research assistant who can scrape specified urls for more detailed information."
            }
            Self::Translate => {
                "You are a translator. Translate the requested text and return only the translation."
            }
            Self::Persist => {
                "You are an expert writing a research document.\n\
                 Below are files currently in your directory:\n{current_files}"
            }
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Search => "search",
            Self::Scrape => "scrape",
            Self::Translate => "translate",
            Self::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// A leaf node wrapping one capability.
///
/// Always contributes exactly one message attributed to its own name. A
/// failing capability becomes an error-tagged message instead of aborting
/// the run.
#[derive(Clone)]
pub struct Worker {
    name: String,
    kind: WorkerKind,
    capability: Arc<dyn Capability>,
    prelude: Option<Arc<dyn Prelude>>,
}

impl Worker {
    pub fn new(name: impl Into<String>, kind: WorkerKind, capability: impl Capability) -> Self {
        Self::from_arc(name, kind, Arc::new(capability))
    }

    pub fn from_arc(name: impl Into<String>, kind: WorkerKind, capability: Arc<dyn Capability>) -> Self {
        Self {
            name: name.into(),
            kind,
            capability,
            prelude: None,
        }
    }

    /// Run `prelude` on the incoming state before every invocation.
    pub fn with_prelude(mut self, prelude: Arc<dyn Prelude>) -> Self {
        self.prelude = Some(prelude);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    async fn call(&self, state: &State) -> troupe_core::Result<String> {
        let input = serde_json::to_value(WorkerInput::from_state(&self.name, state))?;
        self.capability.invoke(input).await
    }
}

impl NodeAction for Worker {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate, GraphError>> {
        Box::pin(async move {
            let state = match &self.prelude {
                Some(prelude) => prelude.prepare(state).await,
                None => state,
            };
            let message = match self.call(&state).await {
                Ok(text) => {
                    debug!(worker = %self.name, len = text.len(), "Worker finished");
                    Message::new(&self.name, text)
                }
                Err(e) => {
                    warn!(worker = %self.name, kind = %self.kind, error = %e, "Capability failed");
                    Message::failure(&self.name, e)
                }
            };
            Ok(StateUpdate::message(message))
        })
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("prelude", &self.prelude.is_some())
            .finish()
    }
}

pub const NO_FILES: &str = "No files written.";

/// Fills `current_files` with a listing of the team's artifact store.
pub struct CurrentFilesPrelude {
    store: Arc<dyn ArtifactStore>,
}

impl CurrentFilesPrelude {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

impl Prelude for CurrentFilesPrelude {
    fn prepare(&self, mut state: State) -> BoxFuture<'_, State> {
        Box::pin(async move {
            let listing = match self.store.list().await {
                Ok(names) if names.is_empty() => NO_FILES.to_string(),
                Ok(names) => {
                    let lines: Vec<String> = names.iter().map(|n| format!(" - {n}")).collect();
                    format!(
                        "\nBelow are files your team has written to the directory:\n{}",
                        lines.join("\n")
                    )
                }
                Err(e) => {
                    debug!(error = %e, "Could not list artifact store");
                    NO_FILES.to_string()
                }
            };
            state.current_files = Some(listing);
            state
        })
    }
}

#[cfg(test)]
mod tests {
    use troupe_test_utils::{FakeCapability, MemoryStore};

    use super::*;

    #[tokio::test]
    async fn test_success_appends_one_attributed_message() {
        let worker = Worker::new("Search", WorkerKind::Search, FakeCapability::replying("found it"));
        let update = worker.run(State::seeded("look")).await.unwrap();
        let messages = update.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].author(), "Search");
        assert_eq!(messages[0].content(), "found it");
        assert!(!messages[0].is_error());
        assert!(update.next.is_none());
    }

    #[tokio::test]
    async fn test_failure_becomes_error_message() {
        let worker = Worker::new("Search", WorkerKind::Search, FakeCapability::failing("quota"));
        let update = worker.run(State::seeded("look")).await.unwrap();
        let messages = update.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].author(), "Search");
        assert!(messages[0].is_error());
        assert!(messages[0].content().starts_with("Error:"));
        assert!(messages[0].content().contains("quota"));
    }

    #[tokio::test]
    async fn test_capability_sees_worker_input() {
        let fake = Arc::new(FakeCapability::replying("ok"));
        let worker = Worker::from_arc("Writer", WorkerKind::Persist, fake.clone());
        let state = State::seeded("draft").with_team_members(vec!["Writer".into()]);
        worker.run(state).await.unwrap();

        let inputs = fake.inputs();
        let input: WorkerInput = serde_json::from_value(inputs[0].clone()).unwrap();
        assert_eq!(input.worker, "Writer");
        assert_eq!(input.messages[0].content(), "draft");
        assert_eq!(input.team_members, vec!["Writer".to_string()]);
        assert_eq!(input.current_files, None);
    }

    #[tokio::test]
    async fn test_prelude_lists_files_locally() {
        let store = Arc::new(MemoryStore::with_docs([("a.txt", "x"), ("b.txt", "y")]));
        let fake = Arc::new(FakeCapability::replying("ok"));
        let worker = Worker::from_arc("Writer", WorkerKind::Persist, fake.clone())
            .with_prelude(Arc::new(CurrentFilesPrelude::new(store)));

        let update = worker.run(State::seeded("draft")).await.unwrap();
        assert!(update.current_files.is_none());

        let input: WorkerInput = serde_json::from_value(fake.inputs()[0].clone()).unwrap();
        assert_eq!(
            input.current_files.as_deref(),
            Some("\nBelow are files your team has written to the directory:\n - a.txt\n - b.txt")
        );
    }

    #[tokio::test]
    async fn test_prelude_empty_store() {
        let prelude = CurrentFilesPrelude::new(Arc::new(MemoryStore::new()));
        let state = prelude.prepare(State::default()).await;
        assert_eq!(state.current_files.as_deref(), Some(NO_FILES));
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(WorkerKind::Search.default_tools(), &["web_search"]);
        assert!(WorkerKind::Persist.default_tools().contains(&"edit_document"));
        assert!(WorkerKind::Persist.default_prompt().contains("{current_files}"));
    }
}
