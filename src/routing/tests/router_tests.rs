//! Name resolution, batch ordering and error containment of the router.

use crate::SharedClock;
use crate::model::domain::ToolSchema;
use crate::routing::domain::ToolCallRequest;
use crate::routing::ports::{LocalTool, LocalToolError};
use crate::routing::services::{RouteError, ToolRouter};
use crate::tool_registry::adapters::{InMemoryConnector, InMemoryServer, InMemoryTool, ToolBehaviour};
use crate::tool_registry::domain::{ServerDescriptor, ServerName, ServerTransport, ToolDefinition, ToolOutput};
use crate::tool_registry::services::{ConnectionPool, InvokeError, RetryPolicy};
use async_trait::async_trait;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Clipboard;

#[async_trait]
impl LocalTool for Clipboard {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("__clipboard__", "Returns its input", json!({"type": "object"}))
    }

    async fn call(&self, arguments: &Value) -> Result<ToolOutput, LocalToolError> {
        if arguments.get("hang_up").and_then(Value::as_bool) == Some(true) {
            return Err(LocalToolError::SessionEnded);
        }
        arguments
            .get("text")
            .and_then(Value::as_str)
            .map(ToolOutput::text)
            .ok_or_else(|| LocalToolError::InvalidArguments("text is required".to_owned()))
    }
}

fn name(raw: &str) -> ServerName {
    ServerName::new(raw).expect("valid server name")
}

fn tool(raw: &str, behaviour: ToolBehaviour) -> InMemoryTool {
    InMemoryTool::new(
        ToolDefinition::new(raw, json!({"type": "object"})).expect("valid definition"),
        behaviour,
    )
}

fn descriptor(raw: &str) -> ServerDescriptor {
    ServerDescriptor::new(
        name(raw),
        ServerTransport::stdio("in-memory").expect("valid transport"),
    )
}

#[fixture]
fn connector() -> InMemoryConnector {
    let connector = InMemoryConnector::new();
    connector.register(
        name("filesystem"),
        InMemoryServer::new()
            .with_tool(
                tool("read_file", ToolBehaviour::Text("slow read".to_owned()))
                    .with_latency(Duration::from_millis(150)),
            )
            .with_tool(tool("search", ToolBehaviour::Text("fs hit".to_owned())))
            .with_tool(tool(
                "missing",
                ToolBehaviour::ToolError("no such file".to_owned()),
            )),
    );
    connector.register(
        name("brave"),
        InMemoryServer::new()
            .with_tool(tool("search", ToolBehaviour::Text("web hit".to_owned())))
            .with_tool(
                tool("fetch", ToolBehaviour::Text("fast fetch".to_owned()))
                    .with_latency(Duration::from_millis(5)),
            ),
    );
    connector
}

async fn router(connector: &InMemoryConnector, servers: &[&str]) -> ToolRouter {
    let clock: SharedClock = Arc::new(DefaultClock);
    let pool = ConnectionPool::connect(
        servers.iter().map(|raw| descriptor(raw)).collect(),
        Arc::new(connector.clone()),
        clock,
        RetryPolicy::new(3, Duration::from_millis(1)),
    )
    .await
    .expect("pool should connect");
    ToolRouter::new(Arc::new(pool), TIMEOUT).with_local_tool(Arc::new(Clipboard))
}

fn request(call_id: &str, tool_name: &str) -> ToolCallRequest {
    ToolCallRequest::new(call_id, tool_name, json!({}))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unique_bare_name_routes_to_owner(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem", "brave"]).await;

    let output = router.dispatch(&request("c1", "fetch")).await;

    assert_eq!(output.ok().map(|out| out.text_content()), Some("fast fetch".to_owned()));
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shared_bare_name_is_ambiguous_but_qualified_name_routes(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem", "brave"]).await;

    let ambiguous = router.dispatch(&request("c1", "search")).await;
    let qualified = router.dispatch(&request("c2", "brave-search")).await;

    match ambiguous {
        Err(RouteError::AmbiguousTool { tool, servers }) => {
            assert_eq!(tool, "search");
            assert_eq!(servers, vec![name("brave"), name("filesystem")]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert_eq!(
        qualified.ok().map(|out| out.text_content()),
        Some("web hit".to_owned())
    );
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_tool_fails_without_contacting_servers(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem", "brave"]).await;
    let calls = |connector: &InMemoryConnector| {
        connector.call_count(&name("filesystem")) + connector.call_count(&name("brave"))
    };
    let calls_before = calls(&connector);

    let result = tokio::time::timeout(
        Duration::from_millis(100),
        router.dispatch(&request("c1", "delete_everything")),
    )
    .await
    .expect("unknown tool must not block");

    assert!(matches!(result, Err(RouteError::UnknownTool(tool)) if tool == "delete_everything"));
    assert_eq!(calls(&connector), calls_before);
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn batch_results_follow_request_order(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem", "brave"]).await;
    let requests = vec![
        request("slow", "read_file"),
        request("unknown", "nope"),
        request("fast", "brave-fetch"),
        request("failing", "missing"),
    ];

    let results = router.dispatch_batch(&requests).await;

    let ids: Vec<_> = results.iter().map(|result| result.call_id.as_str()).collect();
    assert_eq!(ids, vec!["slow", "unknown", "fast", "failing"]);
    let successes: Vec<_> = results.iter().map(|result| result.success).collect();
    assert_eq!(successes, vec![true, false, true, false]);
    let texts: Vec<_> = results.iter().map(|result| result.content_text()).collect();
    assert_eq!(texts.first().map(String::as_str), Some("slow read"));
    assert!(texts.get(1).is_some_and(|text| text.contains("unknown tool: nope")));
    assert!(texts.get(3).is_some_and(|text| text.contains("no such file")));
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tool_error_is_reported_as_tool_failure(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem"]).await;

    let result = router.dispatch(&request("c1", "filesystem-missing")).await;

    assert!(matches!(
        result,
        Err(RouteError::Invoke(InvokeError::ToolFailed { .. }))
    ));
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn local_tools_are_checked_first(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem"]).await;

    let ok = router
        .dispatch(&ToolCallRequest::new("c1", "__clipboard__", json!({"text": "copied"})))
        .await;
    let bad = router.dispatch(&request("c2", "__clipboard__")).await;

    assert_eq!(ok.ok().map(|out| out.text_content()), Some("copied".to_owned()));
    assert!(matches!(
        bad,
        Err(RouteError::LocalToolFailed {
            source: LocalToolError::InvalidArguments(_),
            ..
        })
    ));
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn only_a_session_end_from_a_local_tool_ends_the_session(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem"]).await;

    let outcomes = router
        .dispatch_all(&[
            ToolCallRequest::new("c1", "__clipboard__", json!({"hang_up": true})),
            request("c2", "__clipboard__"),
            request("c3", "filesystem-missing"),
            request("c4", "filesystem-search"),
        ])
        .await;

    let ends: Vec<bool> = outcomes
        .iter()
        .map(|outcome| outcome.as_ref().err().is_some_and(RouteError::ends_session))
        .collect();
    assert_eq!(ends, vec![true, false, false, false]);
    assert_eq!(
        outcomes.last().and_then(|outcome| outcome.as_ref().ok()).map(ToolOutput::text_content),
        Some("fs hit".to_owned())
    );
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn catalogue_lists_local_then_qualified_tools(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem", "brave"]).await;

    let names: Vec<_> = router
        .available_tools()
        .into_iter()
        .map(|schema| schema.name)
        .collect();

    assert_eq!(
        names,
        vec![
            "__clipboard__",
            "brave-fetch",
            "brave-search",
            "filesystem-missing",
            "filesystem-read_file",
            "filesystem-search",
        ]
    );
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn degraded_server_is_excluded_from_routing(connector: InMemoryConnector) {
    connector.register(
        name("flaky"),
        InMemoryServer::new()
            .with_tool(tool("fetch", ToolBehaviour::Text("never".to_owned())))
            .with_handshake_failure("rate limited"),
    );
    let router = router(&connector, &["brave", "flaky"]).await;

    assert!(router.pool().find_tool_owner("flaky-fetch").is_none());
    let output = router.dispatch(&request("c1", "fetch")).await;

    assert_eq!(output.ok().map(|out| out.text_content()), Some("fast fetch".to_owned()));
    router.pool().close().await;
}
