//! Minimal MCP server speaking line-delimited JSON-RPC over stdio.
//!
//! Usage:
//!
//! ```text
//! switchboard-echo-server
//! ```
//!
//! Offers three tools:
//!
//! - `echo` returns its `text` argument
//! - `sleep` waits `millis` milliseconds, then reports how long it slept
//! - `fail` answers with a tool error carrying its `message` argument
//!
//! Requests are handled concurrently, so responses may arrive out of order.
//! Logs go to stderr; stdout carries protocol messages only.

use serde_json::{Value, json};
use std::time::Duration;
use switchboard::tool_registry::adapters::jsonrpc::{
    INVALID_PARAMS, IncomingMessage, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
    PROTOCOL_VERSION, methods,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

const SERVER_NAME: &str = "switchboard-echo-server";

/// Longest sleep a single call may request.
const MAX_SLEEP_MILLIS: u64 = 60_000;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (sender, receiver) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer = tokio::spawn(write_responses(receiver));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match IncomingMessage::parse(&line) {
            Ok(IncomingMessage::Request(request)) => {
                let responses = sender.clone();
                tokio::spawn(async move {
                    let Some(response) = handle(request).await else {
                        return;
                    };
                    if responses.send(response).is_err() {
                        debug!("response dropped after shutdown");
                    }
                });
            }
            Ok(IncomingMessage::Notification(notification)) => {
                debug!(method = %notification.method, "notification received");
            }
            Ok(IncomingMessage::Response(_)) => warn!("unexpected response from client"),
            Err(err) => warn!(error = %err, "ignoring malformed line"),
        }
    }

    drop(sender);
    writer.await??;
    Ok(())
}

async fn write_responses(
    mut receiver: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> Result<(), std::io::Error> {
    let mut stdout = tokio::io::stdout();
    while let Some(response) = receiver.recv().await {
        let mut line = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle(request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id?;
    let params = request.params.unwrap_or(Value::Null);
    let response = match request.method.as_str() {
        methods::INITIALIZE => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
                "instructions": "Test server with echo, sleep and fail tools."
            }),
        ),
        methods::PING => JsonRpcResponse::success(id, json!({})),
        methods::TOOLS_LIST => JsonRpcResponse::success(id, json!({"tools": tool_list()})),
        methods::TOOLS_CALL => match call_tool(&params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(message) => JsonRpcResponse::failure(id, INVALID_PARAMS, message),
        },
        other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("unknown method {other}")),
    };
    Some(response)
}

fn tool_list() -> Value {
    json!([
        {
            "name": "echo",
            "description": "Returns the text it is given",
            "inputSchema": {
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }
        },
        {
            "name": "sleep",
            "description": "Waits for the given number of milliseconds",
            "inputSchema": {
                "type": "object",
                "properties": {"millis": {"type": "integer", "minimum": 0}},
                "required": ["millis"]
            }
        },
        {
            "name": "fail",
            "description": "Always reports a tool error",
            "inputSchema": {
                "type": "object",
                "properties": {"message": {"type": "string"}}
            }
        }
    ])
}

async fn call_tool(params: &Value) -> Result<Value, String> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "tools/call needs a tool name".to_owned())?;
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    match name {
        "echo" => {
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| "echo needs a text argument".to_owned())?;
            Ok(text_result(text, false))
        }
        "sleep" => {
            let millis = arguments
                .get("millis")
                .and_then(Value::as_u64)
                .ok_or_else(|| "sleep needs a millis argument".to_owned())?
                .min(MAX_SLEEP_MILLIS);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(text_result(&format!("slept {millis} ms"), false))
        }
        "fail" => {
            let message = arguments
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("requested failure");
            Ok(text_result(message, true))
        }
        other => Err(format!("unknown tool {other}")),
    }
}

fn text_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error
    })
}
