//! Behaviour of the session loop against scripted humans, models and servers.

use crate::SharedClock;
use crate::conversation::domain::{Role, ToolCallPart};
use crate::model::adapters::ScriptedModel;
use crate::model::domain::{ModelResponse, ModelSpec};
use crate::model::ports::{MockModelBackend, ModelBackend, ModelBackendError};
use crate::session::adapters::{Interaction, ScriptedHuman};
use crate::session::domain::{
    SessionConfig, SessionEvent, SessionFatalError, SessionState, TerminationReason,
};
use crate::session::services::{HUMAN_INPUT_TOOL, Session};
use crate::tool_registry::adapters::{
    InMemoryConnector, InMemoryServer, InMemoryTool, ToolBehaviour,
};
use crate::tool_registry::domain::{ServerDescriptor, ServerName, ServerTransport, ToolDefinition};
use crate::tool_registry::services::{ConnectionPool, RetryPolicy};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn name(raw: &str) -> ServerName {
    ServerName::new(raw).expect("valid server name")
}

fn tool(raw: &str, behaviour: ToolBehaviour) -> InMemoryTool {
    InMemoryTool::new(
        ToolDefinition::new(raw, json!({"type": "object"})).expect("valid definition"),
        behaviour,
    )
}

fn call(call_id: &str, tool_name: &str) -> ToolCallPart {
    ToolCallPart::new(call_id, tool_name, json!({}))
}

#[fixture]
fn config() -> SessionConfig {
    SessionConfig::new(ModelSpec::parse("passthrough").expect("valid model"))
}

#[fixture]
fn connector() -> InMemoryConnector {
    let connector = InMemoryConnector::new();
    connector.register(
        name("filesystem"),
        InMemoryServer::new()
            .with_tool(tool("read_file", ToolBehaviour::Text("file body".to_owned())))
            .with_tool(
                tool("slow_scan", ToolBehaviour::Text("done".to_owned()))
                    .with_latency(Duration::from_secs(30)),
            )
            .with_tool(tool("explode", ToolBehaviour::ProtocolViolation)),
    );
    connector
}

async fn pool(connector: &InMemoryConnector, servers: &[&str]) -> Arc<ConnectionPool> {
    let clock: SharedClock = Arc::new(DefaultClock);
    let descriptors = servers
        .iter()
        .map(|raw| {
            ServerDescriptor::new(
                name(raw),
                ServerTransport::stdio("in-memory").expect("valid transport"),
            )
        })
        .collect();
    let pool = ConnectionPool::connect(
        descriptors,
        Arc::new(connector.clone()),
        clock,
        RetryPolicy::new(1, Duration::from_millis(1)),
    )
    .await
    .expect("pool should connect");
    Arc::new(pool)
}

fn session(
    config: SessionConfig,
    pool: Arc<ConnectionPool>,
    model: Arc<dyn ModelBackend>,
    human: &ScriptedHuman,
) -> Session {
    Session::new(
        config,
        pool,
        model,
        Arc::new(human.clone()),
        Arc::new(DefaultClock),
    )
    .expect("session should build")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn end_signal_closes_pool_once(config: SessionConfig, connector: InMemoryConnector) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new().then_text("hi there");
    let human = ScriptedHuman::new().then_message("hello").then_end();
    let mut session = session(config, Arc::clone(&pool), Arc::new(model), &human);

    let summary = session.run().await.expect("session should end cleanly");

    assert_eq!(summary.reason, TerminationReason::EndSignal);
    assert_eq!(summary.turns, 2);
    assert_eq!(summary.connections_closed, 1);
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(pool.is_closed());
    assert_eq!(connector.close_count(&name("filesystem")), 1);
    assert_eq!(human.assistant_texts(), vec!["hi there".to_owned()]);
    assert_eq!(human.prompts(), vec!["default > ".to_owned(); 2]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tool_round_commits_calls_with_results(
    config: SessionConfig,
    connector: InMemoryConnector,
) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new()
        .then_tool_calls(vec![call("c1", "read_file"), call("c2", "nonexistent")])
        .then_text("the file says hello");
    let human = ScriptedHuman::new().then_message("read it");
    let mut session = session(config, pool, Arc::new(model.clone()), &human);

    session.run().await.expect("session should end cleanly");

    let turns = session.conversation().snapshot().to_vec();
    let roles: Vec<Role> = turns.iter().map(|turn| turn.role()).collect();
    assert_eq!(
        roles,
        vec![
            Role::Human,
            Role::Assistant,
            Role::ToolResult,
            Role::ToolResult,
            Role::Assistant,
        ]
    );
    let results: Vec<(String, bool)> = turns
        .iter()
        .filter_map(|turn| turn.tool_result())
        .map(|result| (result.call_id.clone(), result.success))
        .collect();
    assert_eq!(
        results,
        vec![("c1".to_owned(), true), ("c2".to_owned(), false)]
    );
    let requests = model.requests();
    let second = requests.get(1).expect("model should be called twice");
    assert_eq!(second.turns.len(), 4);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_during_tool_dispatch_discards_the_round(
    config: SessionConfig,
    connector: InMemoryConnector,
) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new().then_tool_calls(vec![call("c1", "slow_scan")]);
    let human = ScriptedHuman::new().then_message("scan everything");
    let mut session = session(config, Arc::clone(&pool), Arc::new(model), &human);
    let token = session.cancellation_token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .expect("cancellation should not wait for the tool")
        .expect("cancellation is not an error");
    canceller.await.expect("canceller should finish");

    assert_eq!(summary.reason, TerminationReason::Cancelled);
    assert_eq!(summary.turns, 1);
    assert!(pool.is_closed());
    assert_eq!(connector.close_count(&name("filesystem")), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_while_waiting_for_input_ends_session(config: SessionConfig) {
    let pool = pool(&InMemoryConnector::new(), &[]).await;
    let human = ScriptedHuman::new().then_wait();
    let mut session = session(config, pool, Arc::new(ScriptedModel::new()), &human);
    session.cancellation_token().cancel();

    let summary = session.run().await.expect("cancellation is not an error");

    assert_eq!(summary.reason, TerminationReason::Cancelled);
    assert_eq!(summary.connections_closed, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn model_errors_are_reported_and_the_session_continues(config: SessionConfig) {
    let pool = pool(&InMemoryConnector::new(), &[]).await;
    let mut model = MockModelBackend::new();
    let mut sequence = mockall::Sequence::new();
    model
        .expect_complete()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Err(ModelBackendError::Timeout(Duration::from_secs(120))));
    model
        .expect_complete()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(ModelResponse::Text("second try".to_owned())));
    let human = ScriptedHuman::new()
        .then_message("first")
        .then_message("second");
    let mut session = session(config, pool, Arc::new(model), &human);

    let summary = session.run().await.expect("model errors are not fatal");

    assert_eq!(summary.reason, TerminationReason::EndSignal);
    assert_eq!(summary.turns, 3);
    let errors = human.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors.iter().all(|error| error.starts_with("model error:")));
    assert_eq!(human.assistant_texts(), vec!["second try".to_owned()]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tool_rounds_are_capped(config: SessionConfig, connector: InMemoryConnector) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new()
        .then_tool_calls(vec![call("c1", "read_file")])
        .then_tool_calls(vec![call("c2", "read_file")])
        .then_tool_calls(vec![call("c3", "read_file")]);
    let human = ScriptedHuman::new().then_message("loop forever");
    let mut session = session(
        config.with_max_tool_rounds(2),
        pool,
        Arc::new(model.clone()),
        &human,
    );

    let summary = session.run().await.expect("the cap is not fatal");

    assert_eq!(summary.turns, 5);
    assert_eq!(model.requests().len(), 3);
    assert_eq!(model.remaining(), 0);
    assert!(
        human
            .errors()
            .iter()
            .any(|error| error.contains("stopped after 2 tool rounds"))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn model_can_ask_the_human(config: SessionConfig) {
    let pool = pool(&InMemoryConnector::new(), &[]).await;
    let model = ScriptedModel::new()
        .then_tool_calls(vec![ToolCallPart::new(
            "ask-1",
            HUMAN_INPUT_TOOL,
            json!({"prompt": "Which city?"}),
        )])
        .then_text("Lisbon it is");
    let human = ScriptedHuman::new()
        .then_message("plan a trip")
        .then_message("Lisbon");
    let mut session = session(config, pool, Arc::new(model.clone()), &human);

    session.run().await.expect("session should end cleanly");

    assert_eq!(
        human.prompts(),
        vec![
            "default > ".to_owned(),
            "answer > ".to_owned(),
            "default > ".to_owned(),
        ]
    );
    assert!(human.events().contains(&SessionEvent::Notice("Which city?".to_owned())));
    let answer = session
        .conversation()
        .snapshot()
        .iter()
        .find_map(|turn| turn.tool_result().map(|result| result.content_text()));
    assert_eq!(answer, Some("Lisbon".to_owned()));
    let first = model.requests();
    let offered: Vec<String> = first
        .first()
        .map(|request| request.tools.iter().map(|schema| schema.name.clone()).collect())
        .unwrap_or_default();
    assert_eq!(offered, vec![HUMAN_INPUT_TOOL.to_owned()]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn single_shot_runs_configured_message_without_prompting(
    config: SessionConfig,
    connector: InMemoryConnector,
) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new().then_text("summary");
    let human = ScriptedHuman::new();
    let config = config.with_human_input(false).with_message("summarise");
    let mut session = session(config, Arc::clone(&pool), Arc::new(model.clone()), &human);

    let summary = session.run().await.expect("single shot should complete");

    assert_eq!(summary.reason, TerminationReason::Completed);
    assert!(human.prompts().is_empty());
    assert_eq!(human.assistant_texts(), vec!["summary".to_owned()]);
    assert!(pool.is_closed());
    let requests = model.requests();
    let tools: Vec<String> = requests
        .first()
        .map(|request| request.tools.iter().map(|schema| schema.name.clone()).collect())
        .unwrap_or_default();
    assert!(!tools.iter().any(|tool| tool == HUMAN_INPUT_TOOL));
    assert_eq!(tools.len(), 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn losing_every_server_is_fatal(config: SessionConfig, connector: InMemoryConnector) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new()
        .then_tool_calls(vec![call("c1", "explode")])
        .then_text("never reached");
    let human = ScriptedHuman::new().then_message("break it");
    let mut session = session(config, Arc::clone(&pool), Arc::new(model.clone()), &human);

    let outcome = session.run().await;

    assert!(matches!(outcome, Err(SessionFatalError::NoLiveServers)));
    assert_eq!(model.remaining(), 1);
    assert!(pool.is_closed());
    assert_eq!(session.state(), SessionState::Terminated);
}

#[rstest]
#[case::with_history(true, 3)]
#[case::without_history(false, 1)]
#[tokio::test(flavor = "multi_thread")]
async fn history_setting_controls_model_context(
    config: SessionConfig,
    #[case] use_history: bool,
    #[case] expected_turns: usize,
) {
    let pool = pool(&InMemoryConnector::new(), &[]).await;
    let model = ScriptedModel::new().then_text("one").then_text("two");
    let human = ScriptedHuman::new()
        .then_message("first")
        .then_message("second");
    let mut session = session(
        config.with_use_history(use_history),
        pool,
        Arc::new(model.clone()),
        &human,
    );

    session.run().await.expect("session should end cleanly");

    let requests = model.requests();
    let last = requests.last().expect("model should be called");
    assert_eq!(last.turns.len(), expected_turns);
    assert_eq!(session.conversation().len(), 4);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn commands_run_without_reaching_the_model(
    config: SessionConfig,
    connector: InMemoryConnector,
) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new().then_text("hello");
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("chat.json");
    let human = ScriptedHuman::new()
        .then_message("hi")
        .then_message("/servers")
        .then_message(format!("/save \"{}\"", path.display()))
        .then_message("/clear")
        .then_message("/teleport")
        .then_message("STOP")
        .then_message("never read");
    let mut session = session(config, pool, Arc::new(model.clone()), &human);

    let summary = session.run().await.expect("session should end cleanly");

    assert_eq!(summary.reason, TerminationReason::EndSignal);
    assert_eq!(summary.turns, 0);
    assert_eq!(model.requests().len(), 1);
    let notices: Vec<String> = human
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Notice(text) => Some(text),
            _ => None,
        })
        .collect();
    assert!(notices.iter().any(|text| text.starts_with("filesystem: ready")));
    assert!(notices.iter().any(|text| text.starts_with("saved 2 turns")));
    assert!(notices.contains(&"cleared 2 turns".to_owned()));
    assert!(human.errors().iter().any(|error| error.contains("teleport")));
    let saved = std::fs::read_to_string(&path).expect("saved file");
    let turns: serde_json::Value = serde_json::from_str(&saved).expect("valid JSON");
    assert_eq!(turns.as_array().map(Vec::len), Some(2));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn human_interface_failure_is_fatal(config: SessionConfig) {
    let pool = pool(&InMemoryConnector::new(), &[]).await;
    let human = ScriptedHuman::new().then_fail();
    let mut session = session(config, Arc::clone(&pool), Arc::new(ScriptedModel::new()), &human);

    let outcome = session.run().await;

    assert!(matches!(outcome, Err(SessionFatalError::HumanInterface(_))));
    assert!(pool.is_closed());
}

fn ask(call_id: &str, question: &str) -> ToolCallPart {
    ToolCallPart::new(call_id, HUMAN_INPUT_TOOL, json!({"prompt": question}))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ending_at_the_answer_prompt_ends_the_session(
    config: SessionConfig,
    connector: InMemoryConnector,
) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new()
        .then_tool_calls(vec![ask("ask-1", "Which city?")])
        .then_text("never reached");
    let human = ScriptedHuman::new()
        .then_message("plan a trip")
        .then_end()
        .then_message("more");
    let mut session = session(config, Arc::clone(&pool), Arc::new(model.clone()), &human);

    let summary = session.run().await.expect("ending is not an error");

    assert_eq!(summary.reason, TerminationReason::EndSignal);
    assert_eq!(summary.turns, 1);
    assert_eq!(summary.connections_closed, 1);
    assert_eq!(model.requests().len(), 1);
    assert_eq!(model.remaining(), 1);
    assert_eq!(
        human.prompts(),
        vec!["default > ".to_owned(), "answer > ".to_owned()]
    );
    assert!(human.errors().is_empty());
    assert!(pool.is_closed());
    assert_eq!(connector.close_count(&name("filesystem")), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ending_at_the_answer_prompt_does_not_wait_for_other_calls(
    config: SessionConfig,
    connector: InMemoryConnector,
) {
    let pool = pool(&connector, &["filesystem"]).await;
    let model = ScriptedModel::new()
        .then_tool_calls(vec![call("c1", "slow_scan"), ask("ask-1", "Keep going?")]);
    let human = ScriptedHuman::new().then_message("scan").then_end();
    let mut session = session(config, Arc::clone(&pool), Arc::new(model), &human);

    let summary = tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .expect("ending should not wait for the scan")
        .expect("ending is not an error");

    assert_eq!(summary.reason, TerminationReason::EndSignal);
    assert_eq!(summary.turns, 1);
    assert!(pool.is_closed());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn questions_in_one_batch_are_asked_one_at_a_time(config: SessionConfig) {
    let pool = pool(&InMemoryConnector::new(), &[]).await;
    let model = ScriptedModel::new()
        .then_tool_calls(vec![
            ask("ask-1", "Which city?"),
            ask("ask-2", "Which month?"),
        ])
        .then_text("booked");
    let human = ScriptedHuman::new()
        .then_message("plan a trip")
        .then_delayed(Duration::from_millis(50), "Lisbon")
        .then_delayed(Duration::from_millis(50), "May");
    let mut session = session(config, pool, Arc::new(model), &human);

    session.run().await.expect("session should end cleanly");

    let asked: Vec<Interaction> = human
        .interactions()
        .into_iter()
        .filter(|entry| match entry {
            Interaction::Prompt(prompt) => prompt == "answer > ",
            Interaction::Displayed(event) => matches!(event, SessionEvent::Notice(_)),
        })
        .collect();
    assert_eq!(
        asked,
        vec![
            Interaction::Displayed(SessionEvent::Notice("Which city?".to_owned())),
            Interaction::Prompt("answer > ".to_owned()),
            Interaction::Displayed(SessionEvent::Notice("Which month?".to_owned())),
            Interaction::Prompt("answer > ".to_owned()),
        ]
    );
    let answers: Vec<(String, String)> = session
        .conversation()
        .snapshot()
        .iter()
        .filter_map(|turn| turn.tool_result())
        .map(|result| (result.call_id.clone(), result.content_text()))
        .collect();
    assert_eq!(
        answers,
        vec![
            ("ask-1".to_owned(), "Lisbon".to_owned()),
            ("ask-2".to_owned(), "May".to_owned()),
        ]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_during_a_reconnect_ends_session(
    config: SessionConfig,
    connector: InMemoryConnector,
) {
    let pool = pool(&connector, &["filesystem"]).await;
    connector.register(name("filesystem"), InMemoryServer::new().with_silent_handshake());
    let human = ScriptedHuman::new()
        .then_message("/reconnect filesystem")
        .then_message("never read");
    let mut session = session(
        config,
        Arc::clone(&pool),
        Arc::new(ScriptedModel::new()),
        &human,
    );
    let token = session.cancellation_token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .expect("cancellation should not wait for the handshake")
        .expect("cancellation is not an error");
    canceller.await.expect("canceller should finish");

    assert_eq!(summary.reason, TerminationReason::Cancelled);
    assert_eq!(summary.connections_closed, 1);
    assert_eq!(human.prompts().len(), 1);
    assert!(pool.is_closed());
}
