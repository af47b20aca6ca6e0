//! Behaviour tests for the interactive session loop.

use std::sync::Arc;
use std::time::Duration;

use eyre::{WrapErr, eyre};
use mockable::DefaultClock;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;
use switchboard::conversation::domain::ToolCallPart;
use switchboard::model::adapters::ScriptedModel;
use switchboard::model::domain::ModelSpec;
use switchboard::model::ports::ModelBackendError;
use switchboard::session::adapters::ScriptedHuman;
use switchboard::session::domain::SessionConfig;
use switchboard::session::services::{Session, SessionSummary};
use switchboard::tool_registry::adapters::{
    InMemoryConnector, InMemoryServer, InMemoryTool, ToolBehaviour,
};
use switchboard::tool_registry::domain::{
    ServerDescriptor, ServerName, ServerTransport, ToolDefinition,
};
use switchboard::tool_registry::services::{ConnectionPool, RetryPolicy};

const SLOW_TOOL: &str = "slow_scan";

#[derive(Default)]
struct SessionWorld {
    connector: InMemoryConnector,
    servers: Vec<ServerName>,
    model: ScriptedModel,
    human: ScriptedHuman,
    session: Option<Session>,
    summary: Option<SessionSummary>,
}

impl SessionWorld {
    fn build_session(&mut self) -> Result<&mut Session, eyre::Report> {
        let descriptors = self
            .servers
            .iter()
            .map(|name| {
                ServerTransport::stdio("in-memory")
                    .map(|transport| ServerDescriptor::new(name.clone(), transport))
            })
            .collect::<Result<Vec<_>, _>>()
            .wrap_err("valid transport")?;
        let pool = run_async(ConnectionPool::connect(
            descriptors,
            Arc::new(self.connector.clone()),
            Arc::new(DefaultClock),
            RetryPolicy::new(1, Duration::from_millis(1)),
        ))
        .wrap_err("pool should connect")?;
        let config = SessionConfig::new(ModelSpec::parse("passthrough").wrap_err("valid model")?);
        let session = Session::new(
            config,
            Arc::new(pool),
            Arc::new(self.model.clone()),
            Arc::new(self.human.clone()),
            Arc::new(DefaultClock),
        )
        .wrap_err("session should build")?;
        Ok(self.session.insert(session))
    }

    fn summary(&self) -> Result<SessionSummary, eyre::Report> {
        self.summary.ok_or_else(|| eyre!("the session has not run"))
    }
}

#[fixture]
fn world() -> SessionWorld {
    SessionWorld::default()
}

fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

fn tool(raw: &str, text: &str, latency: Duration) -> Result<InMemoryTool, eyre::Report> {
    let definition =
        ToolDefinition::new(raw, json!({"type": "object"})).wrap_err("valid tool definition")?;
    Ok(InMemoryTool::new(definition, ToolBehaviour::Text(text.to_owned())).with_latency(latency))
}

#[given(r#"a session connected to server "{server}""#)]
fn session_with_server(world: &mut SessionWorld, server: String) -> Result<(), eyre::Report> {
    let name = ServerName::new(server.as_str()).wrap_err("valid server name")?;
    world.connector.register(
        name.clone(),
        InMemoryServer::new()
            .with_tool(tool("read_file", "file body", Duration::ZERO)?)
            .with_tool(tool(SLOW_TOOL, "scanned", Duration::from_secs(30))?),
    );
    world.servers.push(name);
    Ok(())
}

#[given(r#"the model answers "{text}""#)]
fn model_answers(world: &mut SessionWorld, text: String) {
    world.model = world.model.clone().then_text(text);
}

#[given(r#"the model fails once and then answers "{text}""#)]
fn model_fails_then_answers(world: &mut SessionWorld, text: String) {
    world.model = world
        .model
        .clone()
        .then_error(ModelBackendError::Timeout(Duration::from_secs(30)))
        .then_text(text);
}

#[given("the model calls the slow tool")]
fn model_calls_slow_tool(world: &mut SessionWorld) {
    world.model = world
        .model
        .clone()
        .then_tool_calls(vec![ToolCallPart::new("scan-1", SLOW_TOOL, json!({}))]);
}

#[given(r#"the human types "{text}" and then hangs up"#)]
fn human_types_then_hangs_up(world: &mut SessionWorld, text: String) {
    world.human = world.human.clone().then_message(text).then_end();
}

#[given(r#"the human types "{first}" and then "{second}""#)]
fn human_types_twice(world: &mut SessionWorld, first: String, second: String) {
    world.human = world.human.clone().then_message(first).then_message(second);
}

#[when("the session runs")]
fn session_runs(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    let session = world.build_session()?;
    let summary = run_async(session.run()).wrap_err("session should end cleanly")?;
    world.summary = Some(summary);
    Ok(())
}

#[when("the session is cancelled after {millis:u64} ms")]
fn session_cancelled(world: &mut SessionWorld, millis: u64) -> Result<(), eyre::Report> {
    let session = world.build_session()?;
    let token = session.cancellation_token();
    let summary = run_async(async {
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            token.cancel();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(5), session.run()).await;
        canceller.abort();
        outcome
    })
    .wrap_err("cancellation should not wait for the tool")?
    .wrap_err("cancellation is not an error")?;
    world.summary = Some(summary);
    Ok(())
}

#[then(r#"the session ends with reason "{reason}""#)]
fn session_ends_with(world: &SessionWorld, reason: String) -> Result<(), eyre::Report> {
    let actual = world.summary()?.reason;
    if actual.as_str() != reason {
        return Err(eyre!("expected reason {reason}, got {actual}"));
    }
    Ok(())
}

#[then("every connection was closed exactly once")]
fn connections_closed_once(world: &SessionWorld) -> Result<(), eyre::Report> {
    for name in &world.servers {
        let closes = world.connector.close_count(name);
        if closes != 1 {
            return Err(eyre!("{name} was closed {closes} times"));
        }
    }
    let closed = world.summary()?.connections_closed;
    if closed != world.servers.len() {
        return Err(eyre!("summary reports {closed} closed connections"));
    }
    Ok(())
}

#[then("the conversation holds {count:usize} turns")]
fn conversation_holds(world: &SessionWorld, count: usize) -> Result<(), eyre::Report> {
    let turns = world.summary()?.turns;
    if turns != count {
        return Err(eyre!("expected {count} turns, got {turns}"));
    }
    Ok(())
}

#[then("the human saw {count:usize} model errors")]
fn human_saw_model_errors(world: &SessionWorld, count: usize) -> Result<(), eyre::Report> {
    let errors = world
        .human
        .errors()
        .into_iter()
        .filter(|message| message.starts_with("model error:"))
        .count();
    if errors != count {
        return Err(eyre!("expected {count} model errors, saw {errors}"));
    }
    Ok(())
}

#[then(r#"the human saw the answer "{text}""#)]
fn human_saw_answer(world: &SessionWorld, text: String) -> Result<(), eyre::Report> {
    let answers = world.human.assistant_texts();
    if !answers.contains(&text) {
        return Err(eyre!("expected answer '{text}' among {answers:?}"));
    }
    Ok(())
}

#[scenario(
    path = "tests/features/session_loop.feature",
    name = "The human ends the session"
)]
#[tokio::test(flavor = "multi_thread")]
async fn human_ends_session(world: SessionWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/session_loop.feature",
    name = "A model failure is reported and the session continues"
)]
#[tokio::test(flavor = "multi_thread")]
async fn model_failure_is_recoverable(world: SessionWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/session_loop.feature",
    name = "Cancelling while a tool is running"
)]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_during_tool_call(world: SessionWorld) {
    let _ = world;
}
