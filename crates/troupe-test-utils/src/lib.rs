//! Mocks and fixtures shared by the troupe crates' tests.

mod fakes;
mod fixtures;
mod mock_llm;
mod store;

pub use fakes::{FakeCapability, ScriptedPolicy};
pub use fixtures::{test_config, tool_context};
pub use mock_llm::MockLlmClient;
pub use store::MemoryStore;
