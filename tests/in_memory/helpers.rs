//! Shared builders for in-memory integration tests.

use mockable::DefaultClock;
use rstest::fixture;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchboard::SharedClock;
use switchboard::tool_registry::adapters::{
    InMemoryConnector, InMemoryServer, InMemoryTool, ToolBehaviour,
};
use switchboard::tool_registry::domain::{
    ServerDescriptor, ServerName, ServerTransport, ToolDefinition,
};
use switchboard::tool_registry::services::{ConnectionPool, RetryPolicy};

/// Parses a server name.
pub fn name(raw: &str) -> ServerName {
    ServerName::new(raw).expect("valid server name")
}

/// Builds a tool with the given behaviour and latency.
pub fn tool(raw: &str, behaviour: ToolBehaviour, latency_ms: u64) -> InMemoryTool {
    InMemoryTool::new(
        ToolDefinition::new(raw, json!({"type": "object"}))
            .expect("valid definition")
            .with_description(format!("{raw} tool")),
        behaviour,
    )
    .with_latency(Duration::from_millis(latency_ms))
}

/// Builds a text tool.
pub fn text_tool(raw: &str, text: &str, latency_ms: u64) -> InMemoryTool {
    tool(raw, ToolBehaviour::Text(text.to_owned()), latency_ms)
}

/// Provides a connector with `filesystem`, `brave` and `memory` servers.
///
/// `filesystem` and `brave` both serve `search`.
#[fixture]
pub fn connector() -> InMemoryConnector {
    let connector = InMemoryConnector::new();
    connector.register(
        name("filesystem"),
        InMemoryServer::new()
            .with_tool(text_tool("read_file", "contents", 0))
            .with_tool(text_tool("search", "fs result", 0)),
    );
    connector.register(
        name("brave"),
        InMemoryServer::new()
            .with_tool(text_tool("search", "web result", 0))
            .with_tool(text_tool("slow", "slow result", 300))
            .with_tool(text_tool("medium", "medium result", 100))
            .with_tool(text_tool("fast", "fast result", 5)),
    );
    connector.register(
        name("memory"),
        InMemoryServer::new().with_tool(tool("recall", ToolBehaviour::EchoArguments, 0)),
    );
    connector
}

/// Connects a pool over `connector` to the named servers.
pub async fn connect(connector: &InMemoryConnector, servers: &[&str]) -> ConnectionPool {
    try_connect(connector, servers)
        .await
        .expect("pool should connect")
}

/// Connects a pool, returning the startup error if any.
pub async fn try_connect(
    connector: &InMemoryConnector,
    servers: &[&str],
) -> Result<ConnectionPool, switchboard::tool_registry::services::ConnectionError> {
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
    ConnectionPool::connect(
        descriptors,
        Arc::new(connector.clone()),
        clock,
        RetryPolicy::new(2, Duration::from_millis(1)),
    )
    .await
}
