use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use troupe_core::state::State;

use super::error::GraphError;

/// Name used for the terminal sentinel in edge declarations.
pub const TERMINAL: &str = "__end__";

/// Where a transition leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Node(String),
    Terminal,
}

impl Serialize for Target {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

impl Target {
    /// `TERMINAL` maps to the sentinel, anything else to a node name.
    pub fn parse(name: &str) -> Self {
        if name == TERMINAL {
            Self::Terminal
        } else {
            Self::Node(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Node(name) => name,
            Self::Terminal => TERMINAL,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

pub type RouterFn = Arc<dyn Fn(&State) -> String + Send + Sync>;

/// The outgoing transition of one node.
#[derive(Clone)]
pub enum Edge {
    /// Always go to the target.
    Direct(Target),
    /// Evaluate `router` against the merged state and look the key up in
    /// `mapping`.
    Conditional {
        router: RouterFn,
        mapping: BTreeMap<String, Target>,
    },
}

impl Edge {
    pub fn direct(to: impl Into<Target>) -> Self {
        Self::Direct(to.into())
    }

    pub fn conditional<K, T>(
        router: impl Fn(&State) -> String + Send + Sync + 'static,
        mapping: impl IntoIterator<Item = (K, T)>,
    ) -> Self
    where
        K: Into<String>,
        T: Into<Target>,
    {
        Self::Conditional {
            router: Arc::new(router),
            mapping: mapping
                .into_iter()
                .map(|(k, t)| (k.into(), t.into()))
                .collect(),
        }
    }

    /// Every declared destination.
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Self::Direct(t) => vec![t],
            Self::Conditional { mapping, .. } => mapping.values().collect(),
        }
    }

    /// Pick the next hop from `from`, given the state after `from` ran.
    pub fn resolve(&self, from: &str, state: &State) -> Result<Target, GraphError> {
        match self {
            Self::Direct(t) => Ok(t.clone()),
            Self::Conditional { router, mapping } => {
                let key = router(state);
                mapping.get(&key).cloned().ok_or_else(|| {
                    GraphError::routing(from, format!("router key '{}' has no mapped target", key))
                })
            }
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(t) => f.debug_tuple("Direct").field(t).finish(),
            Self::Conditional { mapping, .. } => f
                .debug_struct("Conditional")
                .field("mapping", mapping)
                .finish_non_exhaustive(),
        }
    }
}

/// Router reading the `next` field a supervisor wrote.
pub fn route_on_next(state: &State) -> String {
    state.next.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use troupe_core::state::StateUpdate;

    use super::*;

    #[test]
    fn test_target_parse() {
        assert_eq!(Target::parse(TERMINAL), Target::Terminal);
        assert_eq!(Target::parse("A"), Target::Node("A".into()));
        assert_eq!(Target::Terminal.to_string(), TERMINAL);
        assert_eq!(serde_json::to_value(Target::Terminal).unwrap(), TERMINAL);
        assert_eq!(serde_json::to_value(Target::Node("A".into())).unwrap(), "A");
    }

    #[test]
    fn test_direct_resolves_unconditionally() {
        let edge = Edge::direct("supervisor");
        assert_eq!(
            edge.resolve("A", &State::default()).unwrap(),
            Target::Node("supervisor".into())
        );
    }

    #[test]
    fn test_conditional_is_deterministic() {
        let edge = Edge::conditional(route_on_next, [("A", "A"), ("FINISH", TERMINAL)]);
        let mut state = State::default();
        state.next = Some("A".into());
        let first = edge.resolve("sup", &state).unwrap();
        let second = edge.resolve("sup", &state).unwrap();
        assert_eq!(first, second);

        state.next = Some("FINISH".into());
        assert_eq!(edge.resolve("sup", &state).unwrap(), Target::Terminal);
    }

    #[test]
    fn test_unmapped_key_is_routing_error() {
        let edge = Edge::conditional(route_on_next, [("A", "A")]);
        let state = troupe_core::state::Schema::default()
            .fold(State::default(), [StateUpdate::new().with_next("C")]);
        let err = edge.resolve("sup", &state).unwrap_err();
        assert!(matches!(err, GraphError::Routing { ref node, .. } if node == "sup"));
    }
}
