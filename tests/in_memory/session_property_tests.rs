//! Whole-session properties: history windows and shutdown.

use super::helpers::{connect, connector, name};
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchboard::conversation::domain::{Role, ToolCallPart};
use switchboard::model::adapters::ScriptedModel;
use switchboard::model::domain::ModelSpec;
use switchboard::session::adapters::ScriptedHuman;
use switchboard::session::domain::{SessionConfig, SessionState, TerminationReason};
use switchboard::session::services::Session;
use switchboard::tool_registry::adapters::InMemoryConnector;
use switchboard::tool_registry::services::ConnectionPool;

const SERVERS: [&str; 3] = ["filesystem", "brave", "memory"];

fn config() -> SessionConfig {
    SessionConfig::new(ModelSpec::parse("passthrough").expect("valid model"))
}

fn session(
    config: SessionConfig,
    pool: &Arc<ConnectionPool>,
    model: &ScriptedModel,
    human: &ScriptedHuman,
) -> Session {
    Session::new(
        config,
        Arc::clone(pool),
        Arc::new(model.clone()),
        Arc::new(human.clone()),
        Arc::new(DefaultClock),
    )
    .expect("session should build")
}

fn assert_closed_once(connector: &InMemoryConnector) {
    for server in SERVERS {
        assert_eq!(
            connector.close_count(&name(server)),
            1,
            "{server} should be closed exactly once"
        );
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn model_never_sees_turns_before_latest_human_input(connector: InMemoryConnector) {
    let pool = Arc::new(connect(&connector, &SERVERS).await);
    let rounds = 12;
    let mut model = ScriptedModel::new();
    let mut human = ScriptedHuman::new();
    for round in 0..rounds {
        model = model
            .then_tool_calls(vec![ToolCallPart::new(
                format!("call-{round}"),
                "read_file",
                json!({"path": format!("/tmp/{round}")}),
            )])
            .then_text(format!("answer {round}"));
        human = human.then_message(format!("question {round}"));
    }
    let mut session = session(config().with_use_history(false), &pool, &model, &human);

    session.run().await.expect("session should end cleanly");

    assert_eq!(session.conversation().len(), rounds * 4);
    let requests = model.requests();
    assert_eq!(requests.len(), rounds * 2);
    for (index, request) in requests.iter().enumerate() {
        let roles: Vec<Role> = request.turns.iter().map(|turn| turn.role()).collect();
        let expected = if index % 2 == 0 {
            vec![Role::Human]
        } else {
            vec![Role::Human, Role::Assistant, Role::ToolResult]
        };
        assert_eq!(roles, expected, "request {index} carried stale turns");
        let question = request
            .turns
            .iter()
            .next()
            .map(|turn| turn.text())
            .unwrap_or_default();
        assert_eq!(question, format!("question {}", index / 2));
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn full_history_grows_with_every_exchange(connector: InMemoryConnector) {
    let pool = Arc::new(connect(&connector, &SERVERS).await);
    let model = ScriptedModel::new()
        .then_text("one")
        .then_text("two")
        .then_text("three");
    let human = ScriptedHuman::new()
        .then_message("a")
        .then_message("b")
        .then_message("c");
    let mut session = session(config(), &pool, &model, &human);

    session.run().await.expect("session should end cleanly");

    let sizes: Vec<usize> = model
        .requests()
        .iter()
        .map(|request| request.turns.len())
        .collect();
    assert_eq!(sizes, vec![1, 3, 5]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn end_signal_closes_every_connection_exactly_once(connector: InMemoryConnector) {
    let pool = Arc::new(connect(&connector, &SERVERS).await);
    let model = ScriptedModel::new().then_text("bye");
    let human = ScriptedHuman::new().then_message("hello").then_message("STOP");
    let mut session = session(config(), &pool, &model, &human);

    let summary = session.run().await.expect("session should end cleanly");

    assert_eq!(summary.reason, TerminationReason::EndSignal);
    assert_eq!(summary.connections_closed, SERVERS.len());
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(pool.close().await, 0);
    assert_closed_once(&connector);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_with_tool_in_flight_closes_every_connection_once(
    connector: InMemoryConnector,
) {
    let pool = Arc::new(connect(&connector, &SERVERS).await);
    let model = ScriptedModel::new().then_tool_calls(vec![
        ToolCallPart::new("c1", "slow", json!({})),
        ToolCallPart::new("c2", "fast", json!({})),
    ]);
    let human = ScriptedHuman::new().then_message("do slow things");
    let mut session = session(config(), &pool, &model, &human);
    let token = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let summary = session.run().await.expect("cancellation is not an error");

    assert_eq!(summary.reason, TerminationReason::Cancelled);
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.conversation().len(), 1);
    assert!(pool.is_closed());
    assert_closed_once(&connector);
}
