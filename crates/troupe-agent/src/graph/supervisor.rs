use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use troupe_core::error::Result as CoreResult;
use troupe_core::state::{State, StateUpdate};
use troupe_core::traits::RoutingPolicy;
use troupe_core::types::{Decision, FINISH};

use super::error::GraphError;
use super::node::NodeAction;

/// A routing node. Asks its policy for the next roster member (or
/// `FINISH`), validates the answer, and records it in `next`.
///
/// Supervisors never add to the transcript.
#[derive(Clone)]
pub struct Supervisor {
    name: String,
    roster: Vec<String>,
    policy: Arc<dyn RoutingPolicy>,
}

impl Supervisor {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        roster: impl IntoIterator<Item = S>,
        policy: impl RoutingPolicy,
    ) -> Self {
        Self::with_policy(name, roster, Arc::new(policy))
    }

    pub fn with_policy<S: Into<String>>(
        name: impl Into<String>,
        roster: impl IntoIterator<Item = S>,
        policy: Arc<dyn RoutingPolicy>,
    ) -> Self {
        Self {
            name: name.into(),
            roster: roster.into_iter().map(Into::into).collect(),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    fn validate(&self, decision: Decision) -> Result<String, GraphError> {
        match decision {
            Decision::Finish => Ok(FINISH.to_string()),
            Decision::Route(member) if self.roster.contains(&member) => Ok(member),
            Decision::Route(member) => Err(GraphError::routing(
                &self.name,
                format!(
                    "'{}' is not one of [{}]",
                    member,
                    self.roster.join(", ")
                ),
            )),
        }
    }
}

impl NodeAction for Supervisor {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate, GraphError>> {
        Box::pin(async move {
            let decision = self
                .policy
                .decide(&state, &self.roster)
                .await
                .map_err(|e| GraphError::routing(&self.name, format!("routing policy failed: {e}")))?;
            let next = self.validate(decision)?;
            debug!(supervisor = %self.name, next = %next, "Supervisor decided");
            Ok(StateUpdate::new()
                .with_next(next)
                .with_team_members(self.roster.clone()))
        })
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.name)
            .field("roster", &self.roster)
            .finish_non_exhaustive()
    }
}

/// Routing policy backed by a synchronous closure.
pub struct FnPolicy<F>(F);

impl<F> FnPolicy<F>
where
    F: Fn(&State, &[String]) -> Decision + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> RoutingPolicy for FnPolicy<F>
where
    F: Fn(&State, &[String]) -> Decision + Send + Sync + 'static,
{
    fn decide<'a>(&'a self, state: &'a State, roster: &'a [String]) -> BoxFuture<'a, CoreResult<Decision>> {
        let decision = (self.0)(state, roster);
        Box::pin(async move { Ok(decision) })
    }
}
