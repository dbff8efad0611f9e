use std::sync::Arc;

use futures::StreamExt;
use troupe_agent::graph::{
    CompileError, GraphBuilder, GraphError, Snapshot, Subgraph, Supervisor, Target, Worker,
    WorkerKind, TERMINAL,
};
use troupe_core::state::{Message, Reducer, Schema, State, StateUpdate};
use troupe_test_utils::{FakeCapability, ScriptedPolicy};

fn worker(name: &str, reply: &str) -> Worker {
    Worker::new(name, WorkerKind::Search, FakeCapability::replying(reply))
}

fn supervised(keys: &[&str], a: Arc<FakeCapability>, b: Arc<FakeCapability>) -> troupe_agent::CompiledGraph {
    GraphBuilder::new()
        .add_supervisor(Supervisor::new(
            "supervisor",
            ["A", "B"],
            ScriptedPolicy::new(keys.iter().copied()),
        ))
        .add_worker(Worker::from_arc("A", WorkerKind::Search, a))
        .add_worker(Worker::from_arc("B", WorkerKind::Scrape, b))
        .report_to("supervisor")
        .set_entry("supervisor")
        .compile()
        .unwrap()
}

fn nodes(snapshots: &[Snapshot]) -> Vec<String> {
    snapshots.iter().map(|s| s.node.to_string()).collect()
}

#[tokio::test]
async fn supervisor_routes_a_then_b_then_finishes() {
    let a = Arc::new(FakeCapability::replying("A-result"));
    let b = Arc::new(FakeCapability::replying("B-result"));
    let graph = supervised(&["A", "B", "FINISH"], a.clone(), b.clone());

    let snapshots: Vec<Snapshot> = graph
        .stream(State::seeded("x"), 25)
        .into_stream()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(
        nodes(&snapshots),
        ["supervisor", "A", "supervisor", "B", "supervisor", TERMINAL]
    );

    let worker_hops: Vec<&Snapshot> = snapshots
        .iter()
        .filter(|s| matches!(&s.node, Target::Node(n) if n != "supervisor"))
        .collect();
    assert_eq!(worker_hops.len(), 2);

    let last = snapshots.last().unwrap();
    assert_eq!(last.step, 5);
    assert_eq!(
        last.state.messages,
        vec![
            Message::user("x"),
            Message::new("A", "A-result"),
            Message::new("B", "B-result"),
        ]
    );
    assert_eq!(last.state.next.as_deref(), Some("FINISH"));
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
}

#[tokio::test]
async fn out_of_roster_decision_stops_before_any_worker() {
    let a = Arc::new(FakeCapability::replying("A-result"));
    let b = Arc::new(FakeCapability::replying("B-result"));
    let graph = supervised(&["C"], a.clone(), b.clone());

    let mut run = graph.stream(State::seeded("x"), 25);
    let err = run.next().await.unwrap().unwrap_err();
    assert!(matches!(err, GraphError::Routing { ref node, .. } if node == "supervisor"));
    assert_eq!(err.kind(), "RoutingError");
    assert!(run.next().await.is_none());
    assert_eq!(a.call_count(), 0);
    assert_eq!(b.call_count(), 0);
    assert_eq!(run.state().messages, vec![Message::user("x")]);
}

#[tokio::test]
async fn step_limit_two_fails_on_third_hop() {
    let a = Arc::new(FakeCapability::replying("again"));
    let b = Arc::new(FakeCapability::replying("unused"));
    let graph = supervised(&["A", "A", "A", "A"], a.clone(), b);

    let mut run = graph.stream(State::seeded("x"), 2);
    let first = run.next().await.unwrap().unwrap();
    let second = run.next().await.unwrap().unwrap();
    assert_eq!(first.step, 1);
    assert_eq!(second.step, 2);

    let err = run.next().await.unwrap().unwrap_err();
    assert_eq!(
        err,
        GraphError::RecursionLimit {
            limit: 2,
            node: "supervisor".into()
        }
    );
    assert!(run.next().await.is_none());

    let kept = run.last_snapshot().unwrap();
    assert_eq!(kept.node, Target::Node("A".into()));
    assert_eq!(kept.state.messages.len(), 2);
    assert_eq!(run.state(), &kept.state);
    assert_eq!(a.call_count(), 1);
}

#[tokio::test]
async fn finishing_in_exactly_step_limit_hops_succeeds() {
    let exact = supervised(
        &["A", "B", "FINISH"],
        Arc::new(FakeCapability::replying("A-result")),
        Arc::new(FakeCapability::replying("B-result")),
    );
    let state = exact.invoke(State::seeded("x"), 5).await.unwrap();
    assert_eq!(state.messages.len(), 3);

    let short = supervised(
        &["A", "B", "FINISH"],
        Arc::new(FakeCapability::replying("A-result")),
        Arc::new(FakeCapability::replying("B-result")),
    );
    let err = short.invoke(State::seeded("x"), 4).await.unwrap_err();
    assert_eq!(
        err,
        GraphError::RecursionLimit {
            limit: 4,
            node: "supervisor".into()
        }
    );
}

#[tokio::test]
async fn subgraph_contributes_only_its_last_message() {
    let first = Arc::new(FakeCapability::replying("draft"));
    let inner = GraphBuilder::new()
        .add_worker(Worker::from_arc("Drafter", WorkerKind::Persist, first.clone()))
        .add_worker(worker("Editor", "final"))
        .add_edge("Drafter", "Editor")
        .add_edge("Editor", TERMINAL)
        .set_entry("Drafter")
        .compile()
        .unwrap();

    let outer = GraphBuilder::new()
        .add_subgraph(Subgraph::new("Team", inner, 10))
        .add_edge("Team", TERMINAL)
        .set_entry("Team")
        .compile()
        .unwrap();

    let state = outer.invoke(State::seeded("go"), 10).await.unwrap();
    assert_eq!(
        state.messages,
        vec![Message::user("go"), Message::new("Editor", "final")]
    );

    let seen: troupe_core::types::WorkerInput =
        serde_json::from_value(first.inputs()[0].clone()).unwrap();
    assert_eq!(seen.messages, vec![Message::user("go")]);
    assert_eq!(seen.team_members, vec!["Drafter".to_string(), "Editor".to_string()]);
}

#[tokio::test]
async fn nested_teams_under_a_top_level_supervisor() {
    let research = GraphBuilder::new()
        .add_supervisor(Supervisor::new("research_lead", ["Search"], ScriptedPolicy::new(["Search", "FINISH"])))
        .add_worker(worker("Search", "three sources"))
        .report_to("research_lead")
        .set_entry("research_lead")
        .compile()
        .unwrap();
    let writing = GraphBuilder::new()
        .add_supervisor(Supervisor::new("writing_lead", ["Writer"], ScriptedPolicy::new(["Writer", "FINISH"])))
        .add_worker(worker("Writer", "paper.md written"))
        .report_to("writing_lead")
        .set_entry("writing_lead")
        .compile()
        .unwrap();

    let top = GraphBuilder::new()
        .add_supervisor(Supervisor::new(
            "top",
            ["ResearchTeam", "PaperWritingTeam"],
            ScriptedPolicy::new(["ResearchTeam", "PaperWritingTeam", "FINISH"]),
        ))
        .add_subgraph(Subgraph::new("ResearchTeam", research, 10))
        .add_subgraph(Subgraph::new("PaperWritingTeam", writing, 10))
        .report_to("top")
        .set_entry("top")
        .compile()
        .unwrap();

    let state = top.invoke(State::seeded("write a paper"), 20).await.unwrap();
    let authors: Vec<&str> = state.messages.iter().map(|m| m.author()).collect();
    assert_eq!(authors, ["user", "Search", "Writer"]);
    assert_eq!(state.team_members, vec!["ResearchTeam".to_string(), "PaperWritingTeam".to_string()]);
}

#[tokio::test]
async fn capability_failure_is_isolated() {
    let a = Arc::new(FakeCapability::failing("search quota exhausted"));
    let b = Arc::new(FakeCapability::replying("B-result"));
    let graph = supervised(&["A", "B", "FINISH"], a, b.clone());

    let state = graph.invoke(State::seeded("x"), 25).await.unwrap();
    assert_eq!(state.messages.len(), 3);
    let failed = &state.messages[1];
    assert_eq!(failed.author(), "A");
    assert!(failed.is_error());
    assert!(failed.content().contains("search quota exhausted"));
    assert_eq!(state.messages[2], Message::new("B", "B-result"));
    assert_eq!(b.call_count(), 1);
}

#[tokio::test]
async fn supervisor_sees_the_accumulated_transcript() {
    let policy = Arc::new(ScriptedPolicy::new(["A", "B", "FINISH"]));
    let graph = GraphBuilder::new()
        .add_supervisor(Supervisor::with_policy("supervisor", ["A", "B"], policy.clone()))
        .add_worker(worker("A", "one"))
        .add_worker(worker("B", "two"))
        .report_to("supervisor")
        .set_entry("supervisor")
        .compile()
        .unwrap();
    graph.invoke(State::seeded("x"), 25).await.unwrap();

    let lengths: Vec<usize> = policy.seen().iter().map(|s| s.messages.len()).collect();
    assert_eq!(lengths, [1, 2, 3]);
}

#[tokio::test]
async fn custom_reducer_is_applied_per_field() {
    let schema = Schema {
        team_members: Reducer::Append,
        ..Schema::default()
    };
    let graph = GraphBuilder::new()
        .add_fn("first", |_s: State| async {
            Ok::<_, GraphError>(StateUpdate::new().with_team_members(vec!["a".into()]))
        })
        .add_fn("second", |_s: State| async {
            Ok::<_, GraphError>(StateUpdate::new().with_team_members(vec!["b".into()]))
        })
        .add_edge("first", "second")
        .add_edge("second", TERMINAL)
        .set_entry("first")
        .with_schema(schema)
        .compile()
        .unwrap();

    let state = graph.invoke(State::default(), 5).await.unwrap();
    assert_eq!(state.team_members, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn dangling_references_never_compile() {
    let result = GraphBuilder::new()
        .add_supervisor(Supervisor::new("supervisor", ["A", "Missing"], ScriptedPolicy::new(["A"])))
        .add_worker(worker("A", "ok"))
        .add_edge("A", "supervisor")
        .set_entry("supervisor")
        .compile();
    assert_eq!(
        result.unwrap_err(),
        CompileError::DanglingEdge {
            from: "supervisor".into(),
            to: "Missing".into()
        }
    );
}
