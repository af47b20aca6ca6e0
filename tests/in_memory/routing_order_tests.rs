//! Ordering and containment properties of batch dispatch.

use super::helpers::{connect, connector, name, text_tool, try_connect};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchboard::routing::domain::ToolCallRequest;
use switchboard::routing::services::{RouteError, ToolRouter};
use switchboard::tool_registry::adapters::{InMemoryConnector, InMemoryServer};

fn request(call_id: &str, tool: &str) -> ToolCallRequest {
    ToolCallRequest::new(call_id, tool, json!({}))
}

async fn router(connector: &InMemoryConnector, servers: &[&str]) -> ToolRouter {
    ToolRouter::new(
        Arc::new(connect(connector, servers).await),
        Duration::from_secs(5),
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn results_follow_request_order_under_skewed_latency(connector: InMemoryConnector) {
    let router = router(&connector, &["brave"]).await;
    let requests = [
        request("c1", "slow"),
        request("c2", "fast"),
        request("c3", "medium"),
        request("c4", "fast"),
    ];

    let started = Instant::now();
    let results = router.dispatch_batch(&requests).await;
    let elapsed = started.elapsed();

    let ids: Vec<&str> = results.iter().map(|result| result.call_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
    let texts: Vec<String> = results.iter().map(|result| result.content_text()).collect();
    assert_eq!(
        texts,
        vec!["slow result", "fast result", "medium result", "fast result"]
    );
    assert!(
        elapsed < Duration::from_millis(400),
        "calls should run concurrently, took {elapsed:?}"
    );
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ambiguous_bare_name_fails_while_qualified_names_succeed(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem", "brave"]).await;

    let results = router
        .dispatch_batch(&[
            request("c1", "search"),
            request("c2", "brave-search"),
            request("c3", "filesystem-search"),
        ])
        .await;

    let outcomes: Vec<(bool, String)> = results
        .iter()
        .map(|result| (result.success, result.content_text()))
        .collect();
    assert!(!outcomes.first().is_some_and(|(success, _)| *success));
    assert!(
        outcomes
            .first()
            .is_some_and(|(_, text)| text.contains("brave-search"))
    );
    assert_eq!(outcomes.get(1), Some(&(true, "web result".to_owned())));
    assert_eq!(outcomes.get(2), Some(&(true, "fs result".to_owned())));
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_tool_never_blocks_or_reaches_a_server(connector: InMemoryConnector) {
    let router = router(&connector, &["filesystem", "brave"]).await;

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        router.dispatch(&request("c1", "teleport")),
    )
    .await
    .expect("unknown tools resolve immediately");

    assert!(matches!(outcome, Err(RouteError::UnknownTool(tool)) if tool == "teleport"));
    assert_eq!(connector.call_count(&name("filesystem")), 0);
    assert_eq!(connector.call_count(&name("brave")), 0);
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn server_failing_handshake_is_never_an_owner(connector: InMemoryConnector) {
    connector.register(
        name("broken"),
        InMemoryServer::new()
            .with_tool(text_tool("only_here", "unreachable", 0))
            .with_handshake_failure("initialize rejected"),
    );
    let pool = try_connect(&connector, &["broken", "memory"])
        .await
        .expect("one reachable server is enough");

    assert!(pool.find_tool_owner("only_here").is_none());
    assert!(pool.find_tool_owner("recall").is_some());
    let router = ToolRouter::new(Arc::new(pool), Duration::from_secs(5));
    let outcome = router.dispatch(&request("c1", "only_here")).await;
    assert!(matches!(outcome, Err(RouteError::UnknownTool(_))));
    router.pool().close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn arguments_reach_the_tool(connector: InMemoryConnector) {
    let router = router(&connector, &["memory"]).await;

    let output = router
        .dispatch(&ToolCallRequest::new(
            "c1",
            "memory-recall",
            json!({"key": "favourite colour"}),
        ))
        .await
        .expect("recall should succeed");

    assert_eq!(
        output.structured(),
        Some(&json!({"key": "favourite colour"}))
    );
    router.pool().close().await;
}
