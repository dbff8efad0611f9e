//! Shared graph state and its per-field reducer table.
//!
//! A graph run accumulates a single [`State`]. Nodes never mutate it directly:
//! they return a [`StateUpdate`] and the owning graph merges it with its
//! [`Schema`], which declares one [`Reducer`] per field.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Author used for the seed message of a run.
pub const USER: &str = "user";

/// An attributed transcript entry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    author: String,
    content: String,
    #[serde(default, skip_serializing_if = "is_false")]
    is_error: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Message {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A message authored by the requesting user.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(USER, content)
    }

    /// An error-tagged message attributed to `author`.
    pub fn failure(author: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            author: author.into(),
            content: format!("Error: {}", reason),
            is_error: true,
        }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

/// Accumulated state of one compiled-graph instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub team_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_files: Option<String>,
}

impl State {
    /// State holding a single user message.
    pub fn seeded(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
            ..Self::default()
        }
    }

    pub fn with_team_members(mut self, members: Vec<String>) -> Self {
        self.team_members = members;
        self
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Partial state returned by a node. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Option<Vec<Message>>,
    pub team_members: Option<Vec<String>>,
    pub next: Option<String>,
    pub current_files: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// An update carrying a single message.
    pub fn message(message: Message) -> Self {
        Self::new().with_message(message)
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.get_or_insert_with(Vec::new).push(message);
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_team_members(mut self, members: Vec<String>) -> Self {
        self.team_members = Some(members);
        self
    }

    pub fn with_current_files(mut self, files: impl Into<String>) -> Self {
        self.current_files = Some(files.into());
        self
    }
}

/// Values that support the `Append` reducer.
pub trait Accumulate: Default {
    fn accumulate(&mut self, incoming: Self);
}

impl<T> Accumulate for Vec<T> {
    fn accumulate(&mut self, incoming: Self) {
        self.extend(incoming);
    }
}

impl Accumulate for Option<String> {
    fn accumulate(&mut self, incoming: Self) {
        match (self.as_mut(), incoming) {
            (Some(current), Some(more)) => current.push_str(&more),
            (None, more) => *self = more,
            (Some(_), None) => {}
        }
    }
}

pub type ReduceFn<T> = Arc<dyn Fn(T, T) -> T + Send + Sync>;

/// Merge function for one state field.
pub enum Reducer<T> {
    /// Concatenate the incoming value onto the current one.
    Append,
    /// Replace the current value.
    Overwrite,
    /// `(current, incoming) -> merged`.
    Custom(ReduceFn<T>),
}

impl<T> Reducer<T> {
    pub fn custom(f: impl Fn(T, T) -> T + Send + Sync + 'static) -> Self {
        Reducer::Custom(Arc::new(f))
    }
}

impl<T: Accumulate> Reducer<T> {
    pub fn apply(&self, current: &mut T, incoming: T) {
        match self {
            Reducer::Append => current.accumulate(incoming),
            Reducer::Overwrite => *current = incoming,
            Reducer::Custom(f) => {
                let previous = std::mem::take(current);
                *current = f(previous, incoming);
            }
        }
    }
}

impl<T> Clone for Reducer<T> {
    fn clone(&self) -> Self {
        match self {
            Reducer::Append => Reducer::Append,
            Reducer::Overwrite => Reducer::Overwrite,
            Reducer::Custom(f) => Reducer::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Reducer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Append => f.write_str("Append"),
            Reducer::Overwrite => f.write_str("Overwrite"),
            Reducer::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// The reducer table declared alongside [`State`].
///
/// Defaults: `messages` appends, every other field is overwritten.
#[derive(Debug, Clone)]
pub struct Schema {
    pub messages: Reducer<Vec<Message>>,
    pub team_members: Reducer<Vec<String>>,
    pub next: Reducer<Option<String>>,
    pub current_files: Reducer<Option<String>>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            messages: Reducer::Append,
            team_members: Reducer::Overwrite,
            next: Reducer::Overwrite,
            current_files: Reducer::Overwrite,
        }
    }
}

impl Schema {
    /// Merge one partial update into `state`, field by field.
    pub fn merge(&self, state: &mut State, update: StateUpdate) {
        if let Some(messages) = update.messages {
            self.messages.apply(&mut state.messages, messages);
        }
        if let Some(members) = update.team_members {
            self.team_members.apply(&mut state.team_members, members);
        }
        if let Some(next) = update.next {
            self.next.apply(&mut state.next, Some(next));
        }
        if let Some(files) = update.current_files {
            self.current_files.apply(&mut state.current_files, Some(files));
        }
    }

    /// Replay an ordered sequence of updates against `initial`.
    pub fn fold(&self, initial: State, updates: impl IntoIterator<Item = StateUpdate>) -> State {
        updates.into_iter().fold(initial, |mut state, update| {
            self.merge(&mut state, update);
            state
        })
    }
}
