//! End-to-end tests over the real stdio transport, using the
//! `switchboard-echo-server` fixture binary.

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use switchboard::config::Settings;
use switchboard::model::adapters::PassthroughModel;
use switchboard::routing::domain::ToolCallRequest;
use switchboard::routing::services::ToolRouter;
use switchboard::session::adapters::ScriptedHuman;
use switchboard::session::domain::{SessionEvent, TerminationReason};
use switchboard::session::services::Session;
use switchboard::tool_registry::adapters::DefaultConnector;
use switchboard::tool_registry::domain::{ConnectionStatus, ServerName};
use switchboard::tool_registry::services::{ConnectionPool, RetryPolicy};

const ECHO_SERVER: &str = env!("CARGO_BIN_EXE_switchboard-echo-server");

#[fixture]
fn settings() -> Settings {
    Settings::from_yaml(&format!(
        "mcp:\n  servers:\n    echo:\n      command: \"{ECHO_SERVER}\"\n      env:\n        RUST_LOG: warn\n"
    ))
    .expect("settings should parse")
}

async fn connect(settings: &Settings) -> ConnectionPool {
    ConnectionPool::connect(
        settings.server_descriptors().expect("descriptors"),
        Arc::new(DefaultConnector),
        Arc::new(DefaultClock),
        RetryPolicy::default(),
    )
    .await
    .expect("echo server should connect")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn handshake_discovers_echo_server_tools(settings: Settings) {
    let pool = connect(&settings).await;

    let mut names: Vec<String> = pool.tools().iter().map(|tool| tool.name().to_owned()).collect();
    names.sort();

    assert_eq!(names, vec!["echo", "fail", "sleep"]);
    let report = pool.health_report().await;
    assert!(
        report
            .iter()
            .all(|server| server.status == ConnectionStatus::Ready)
    );
    assert_eq!(pool.close().await, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_calls_over_one_process_keep_request_order(settings: Settings) {
    let router = ToolRouter::new(Arc::new(connect(&settings).await), Duration::from_secs(5));
    let requests = [
        ToolCallRequest::new("c1", "sleep", json!({"millis": 300})),
        ToolCallRequest::new("c2", "echo", json!({"text": "first back"})),
        ToolCallRequest::new("c3", "echo-fail", json!({"message": "on purpose"})),
        ToolCallRequest::new("c4", "sleep", json!({"millis": 50})),
    ];

    let results = router.dispatch_batch(&requests).await;

    let ids: Vec<&str> = results.iter().map(|result| result.call_id.as_str()).collect();
    let flags: Vec<bool> = results.iter().map(|result| result.success).collect();
    let texts: Vec<String> = results.iter().map(|result| result.content_text()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
    assert_eq!(flags, vec![true, true, false, true]);
    assert_eq!(texts.first().map(String::as_str), Some("slept 300 ms"));
    assert_eq!(texts.get(1).map(String::as_str), Some("first back"));
    assert!(texts.get(2).is_some_and(|text| text.contains("on purpose")));
    assert_eq!(texts.get(3).map(String::as_str), Some("slept 50 ms"));
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tool_timeout_fails_only_that_call(settings: Settings) {
    let router = ToolRouter::new(
        Arc::new(connect(&settings).await),
        Duration::from_millis(100),
    );

    let results = router
        .dispatch_batch(&[
            ToolCallRequest::new("slow", "sleep", json!({"millis": 2000})),
            ToolCallRequest::new("quick", "echo", json!({"text": "still here"})),
        ])
        .await;

    let flags: Vec<bool> = results.iter().map(|result| result.success).collect();
    assert_eq!(flags, vec![false, true]);
    assert_eq!(
        router
            .pool()
            .get(&ServerName::new("echo").expect("valid name"))
            .map(|connection| connection.status()),
        Some(ConnectionStatus::Ready)
    );
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn passthrough_session_calls_a_real_server(settings: Settings) {
    let pool = Arc::new(connect(&settings).await);
    let human = ScriptedHuman::new().then_message(r#"***CALL_TOOL echo {"text": "round trip"}"#);
    let config = settings
        .session_config()
        .expect("session config")
        .with_human_input(true);
    let mut session = Session::new(
        config,
        Arc::clone(&pool),
        Arc::new(PassthroughModel::new()),
        Arc::new(human.clone()),
        Arc::new(DefaultClock),
    )
    .expect("session should build");

    let summary = session.run().await.expect("session should end cleanly");

    assert_eq!(summary.reason, TerminationReason::EndSignal);
    assert_eq!(summary.connections_closed, 1);
    assert!(human.events().iter().any(|event| matches!(
        event,
        SessionEvent::ToolResult { success: true, content, .. } if content == "round trip"
    )));
    assert_eq!(human.assistant_texts(), vec!["round trip".to_owned()]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn settings_file_on_disk_drives_the_connection() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        "agent:\n  servers: [echo]\nmcp:\n  servers:\n    echo:\n      command: \"{ECHO_SERVER}\"\n      tools: [echo, sleep, fail]\n"
    )
    .expect("write settings");
    let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf-8 temp path");

    let settings = Settings::load(&path).expect("settings load");
    let pool = connect(&settings).await;

    assert_eq!(pool.ready_count(), 1);
    assert!(pool.find_tool_owner("echo").is_some());
    pool.close().await;
}
