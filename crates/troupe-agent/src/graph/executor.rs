use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use troupe_core::state::State;
use troupe_core::types::RunId;

use super::compiled::CompiledGraph;
use super::edge::Target;
use super::error::GraphError;

/// The state of a run right after one hop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Node executions so far, this one included.
    pub step: usize,
    /// The node that just ran, or [`Target::Terminal`] for the closing
    /// snapshot.
    pub node: Target,
    pub state: State,
}

enum Position {
    Run(String),
    Route { from: String },
    Done,
}

/// One lazy run of a [`CompiledGraph`].
///
/// Each call to [`next`](Self::next) executes at most one node, merges its
/// update, and yields the resulting snapshot. The run ends after the
/// terminal snapshot or after the first error; every later call returns
/// `None`.
pub struct Execution {
    graph: CompiledGraph,
    state: State,
    step: usize,
    step_limit: usize,
    position: Position,
    last: Option<Snapshot>,
    run_id: RunId,
    span: Span,
}

impl Execution {
    pub(crate) fn new(graph: CompiledGraph, initial: State, step_limit: usize) -> Self {
        let run_id = RunId::new();
        let span = info_span!("graph", run = %run_id, entry = %graph.entry(), step_limit);
        let position = Position::Run(graph.entry().to_string());
        Self {
            graph,
            state: initial,
            step: 0,
            step_limit,
            position,
            last: None,
            run_id,
            span,
        }
    }

    pub async fn next(&mut self) -> Option<Result<Snapshot, GraphError>> {
        let span = self.span.clone();
        self.advance().instrument(span).await
    }

    async fn advance(&mut self) -> Option<Result<Snapshot, GraphError>> {
        loop {
            match std::mem::replace(&mut self.position, Position::Done) {
                Position::Done => return None,

                Position::Route { from } => {
                    let Some(edge) = self.graph.edge(&from) else {
                        return Some(Err(self.fail(GraphError::routing(&from, "no outgoing edge"))));
                    };
                    match edge.resolve(&from, &self.state) {
                        Ok(Target::Terminal) => {
                            debug!(from = %from, "Reached terminal");
                            return Some(Ok(self.record(Target::Terminal)));
                        }
                        Ok(Target::Node(to)) => {
                            debug!(from = %from, to = %to, "Routing");
                            self.position = Position::Run(to);
                        }
                        Err(e) => return Some(Err(self.fail(e))),
                    }
                }

                Position::Run(name) => {
                    if self.step >= self.step_limit {
                        let err = GraphError::RecursionLimit {
                            limit: self.step_limit,
                            node: name,
                        };
                        return Some(Err(self.fail(err)));
                    }
                    let Some(node) = self.graph.node(&name).cloned() else {
                        let err = GraphError::routing(&name, "target node is not registered");
                        return Some(Err(self.fail(err)));
                    };

                    self.step += 1;
                    info!(step = self.step, node = %name, kind = %node.kind(), "Running node");

                    match node.run(self.state.clone()).await {
                        Ok(update) => {
                            self.graph.schema().merge(&mut self.state, update);
                            let snapshot = self.record(Target::Node(name.clone()));
                            self.position = Position::Route { from: name };
                            return Some(Ok(snapshot));
                        }
                        Err(e) => return Some(Err(self.fail(e))),
                    }
                }
            }
        }
    }

    fn record(&mut self, node: Target) -> Snapshot {
        let snapshot = Snapshot {
            step: self.step,
            node,
            state: self.state.clone(),
        };
        self.last = Some(snapshot.clone());
        snapshot
    }

    fn fail(&self, err: GraphError) -> GraphError {
        warn!(kind = err.kind(), error = %err, steps = self.step, "Graph run aborted");
        err
    }

    /// The most recent snapshot, if any hop completed.
    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    /// Accumulated state so far. After an error this is the state as of the
    /// last successful hop.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Id carried on this run's tracing span.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Node executions so far.
    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Snapshot, GraphError>> {
        stream::unfold(self, |mut run| async move {
            run.next().await.map(|item| (item, run))
        })
        .boxed()
    }

    /// Drain the run and return the final state.
    pub async fn run_to_end(mut self) -> Result<State, GraphError> {
        while let Some(item) = self.next().await {
            item?;
        }
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use troupe_core::state::{Message, StateUpdate};

    use super::super::builder::GraphBuilder;
    use super::super::edge::TERMINAL;
    use super::*;

    fn echo(name: &'static str) -> impl Fn(State) -> futures::future::Ready<Result<StateUpdate, GraphError>> {
        move |_state| futures::future::ready(Ok(StateUpdate::message(Message::new(name, name))))
    }

    fn chain() -> CompiledGraph {
        GraphBuilder::new()
            .add_fn("A", echo("A"))
            .add_fn("B", echo("B"))
            .add_edge("A", "B")
            .add_edge("B", TERMINAL)
            .set_entry("A")
            .compile()
            .unwrap()
    }

    #[tokio::test]
    async fn test_linear_run_emits_terminal_snapshot() {
        let mut run = chain().stream(State::seeded("go"), 10);
        let first = run.next().await.unwrap().unwrap();
        assert_eq!(first.node, Target::Node("A".into()));
        assert_eq!(first.step, 1);
        let second = run.next().await.unwrap().unwrap();
        assert_eq!(second.node, Target::Node("B".into()));
        let last = run.next().await.unwrap().unwrap();
        assert_eq!(last.node, Target::Terminal);
        assert_eq!(last.step, 2);
        assert_eq!(last.state.messages.len(), 3);
        assert!(run.next().await.is_none());
        assert!(run.next().await.is_none());
    }

    #[tokio::test]
    async fn test_nothing_runs_until_polled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let graph = GraphBuilder::new()
            .add_fn("A", move |_state: State| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, GraphError>(StateUpdate::new()) }
            })
            .add_edge("A", TERMINAL)
            .set_entry("A")
            .compile()
            .unwrap();

        let run = graph.stream(State::default(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let snapshots: Vec<_> = run.into_stream().collect().await;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_step_limit_counts_node_executions() {
        let graph = GraphBuilder::new()
            .add_fn("loop", echo("loop"))
            .add_edge("loop", "loop")
            .set_entry("loop")
            .compile()
            .unwrap();

        let mut run = graph.stream(State::default(), 3);
        for _ in 0..3 {
            assert!(run.next().await.unwrap().is_ok());
        }
        let err = run.next().await.unwrap().unwrap_err();
        assert_eq!(
            err,
            GraphError::RecursionLimit {
                limit: 3,
                node: "loop".into()
            }
        );
        assert_eq!(run.steps(), 3);
        assert_eq!(run.state().messages.len(), 3);
        assert_eq!(run.last_snapshot().unwrap().step, 3);
        assert!(run.next().await.is_none());
    }

    #[tokio::test]
    async fn test_zero_limit_runs_nothing() {
        let err = chain().invoke(State::default(), 0).await.unwrap_err();
        assert!(matches!(err, GraphError::RecursionLimit { limit: 0, .. }));
    }

    #[tokio::test]
    async fn test_node_error_stops_run() {
        let graph = GraphBuilder::new()
            .add_fn("bad", |_state: State| async {
                Err(GraphError::composition("bad", "boom"))
            })
            .add_edge("bad", TERMINAL)
            .set_entry("bad")
            .compile()
            .unwrap();
        let mut run = graph.stream(State::seeded("x"), 5);
        assert!(run.next().await.unwrap().is_err());
        assert!(run.next().await.is_none());
        assert!(run.last_snapshot().is_none());
        assert_eq!(run.state().messages.len(), 1);
    }

    #[test]
    fn test_each_run_gets_its_own_id() {
        let graph = chain();
        let one = graph.stream(State::default(), 5);
        let two = graph.stream(State::default(), 5);
        assert_ne!(one.run_id(), two.run_id());
    }

    #[tokio::test]
    async fn test_independent_runs_do_not_share_state() {
        let graph = chain();
        let one = graph.invoke(State::seeded("one"), 10).await.unwrap();
        let two = graph.invoke(State::seeded("two"), 10).await.unwrap();
        assert_eq!(one.messages[0].content(), "one");
        assert_eq!(two.messages[0].content(), "two");
        assert_eq!(two.messages.len(), 3);
    }
}
