//! JSON-RPC 2.0 framing and the tool-protocol messages built on it.
//!
//! Both the stdio and HTTP adapters speak newline-free JSON objects; this
//! module owns their shape so the adapters only move bytes.

use crate::tool_registry::domain::{ServerInfo, ToolDefinition, ToolOutput};
use crate::tool_registry::ports::{
    CallOutcome, InitializeOutcome, ToolPage, TransportError, TransportResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// JSON-RPC version tag.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision requested during the handshake.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Method names used on the wire.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Tool listing request.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation request.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Liveness probe.
    pub const PING: &str = "ping";
}

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code for malformed parameters.
pub const INVALID_PARAMS: i64 = -32602;

/// A request or notification. Notifications carry no `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Builds a request with a numeric identifier.
    #[must_use]
    pub fn call(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(Value::from(id)),
            method: method.to_owned(),
            params,
        }
    }

    /// Builds a notification.
    #[must_use]
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: None,
            method: method.to_owned(),
            params,
        }
    }
}

/// Error object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response to an earlier request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Identifier of the request being answered.
    pub id: Value,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Returns the numeric request id, if the id is numeric.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_u64()
    }

    /// Converts the response into the payload or a remote error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Remote`] for error responses and
    /// [`TransportError::Protocol`] when neither field is present.
    pub fn into_result(self) -> TransportResult<Value> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(TransportError::Remote {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(TransportError::protocol(
                "response carries neither result nor error",
            )),
        }
    }
}

/// Any message a peer may send.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Answer to one of our requests.
    Response(JsonRpcResponse),
    /// Request the peer expects us to answer.
    Request(JsonRpcRequest),
    /// Fire-and-forget notification.
    Notification(JsonRpcRequest),
}

impl IncomingMessage {
    /// Parses one JSON-RPC message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] when the text is not a JSON-RPC
    /// message.
    pub fn parse(text: &str) -> TransportResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| TransportError::protocol(format!("invalid JSON: {err}")))?;
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some_and(|id| !id.is_null());

        let message = if has_method {
            let request: JsonRpcRequest = serde_json::from_value(value)
                .map_err(|err| TransportError::protocol(format!("invalid request: {err}")))?;
            if has_id {
                Self::Request(request)
            } else {
                Self::Notification(request)
            }
        } else {
            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|err| TransportError::protocol(format!("invalid response: {err}")))?;
            Self::Response(response)
        };
        Ok(message)
    }
}

/// Parameters of the `initialize` request.
#[must_use]
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {"name": client_name, "version": client_version},
    })
}

/// Parameters of a `tools/list` request.
#[must_use]
pub fn list_tools_params(cursor: Option<&str>) -> Option<Value> {
    cursor.map(|value| json!({"cursor": value}))
}

/// Parameters of a `tools/call` request.
#[must_use]
pub fn call_tool_params(name: &str, arguments: &Value) -> Value {
    json!({"name": name, "arguments": arguments})
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInitializeResult {
    protocol_version: String,
    #[serde(default)]
    server_info: Option<ServerInfo>,
    #[serde(default)]
    instructions: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
    #[serde(default)]
    output_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireToolPage {
    #[serde(default)]
    tools: Vec<WireTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCallResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    structured_content: Option<Value>,
    #[serde(default)]
    is_error: bool,
}

/// Decodes an `initialize` result.
///
/// # Errors
///
/// Returns [`TransportError::Protocol`] when the payload is malformed.
pub fn parse_initialize_result(value: Value) -> TransportResult<InitializeOutcome> {
    let wire: WireInitializeResult = serde_json::from_value(value)
        .map_err(|err| TransportError::protocol(format!("invalid initialize result: {err}")))?;
    Ok(InitializeOutcome {
        protocol_version: wire.protocol_version,
        server_info: wire.server_info,
        instructions: wire.instructions,
    })
}

/// Decodes a `tools/list` result.
///
/// A tool without an input schema is given an empty object schema.
///
/// # Errors
///
/// Returns [`TransportError::Protocol`] when the payload or any tool in it
/// is malformed.
pub fn parse_tool_page(value: Value) -> TransportResult<ToolPage> {
    let wire: WireToolPage = serde_json::from_value(value)
        .map_err(|err| TransportError::protocol(format!("invalid tool listing: {err}")))?;
    let tools = wire
        .tools
        .into_iter()
        .map(|tool| {
            let schema = tool
                .input_schema
                .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
            let mut definition = ToolDefinition::new(tool.name, schema)
                .map_err(|err| TransportError::protocol(err.to_string()))?;
            if let Some(description) = tool.description {
                definition = definition.with_description(description);
            }
            if let Some(output_schema) = tool.output_schema {
                definition = definition.with_output_schema(output_schema);
            }
            Ok(definition)
        })
        .collect::<TransportResult<Vec<_>>>()?;
    Ok(ToolPage {
        tools,
        next_cursor: wire.next_cursor.filter(|cursor| !cursor.is_empty()),
    })
}

/// Decodes a `tools/call` result.
///
/// # Errors
///
/// Returns [`TransportError::Protocol`] when the payload is malformed.
pub fn parse_call_result(value: Value) -> TransportResult<CallOutcome> {
    let wire: WireCallResult = serde_json::from_value(value)
        .map_err(|err| TransportError::protocol(format!("invalid call result: {err}")))?;
    let output = ToolOutput::new(wire.content).with_structured(wire.structured_content);
    if wire.is_error {
        let text = output.text_content();
        let message = if text.is_empty() {
            "tool reported an error".to_owned()
        } else {
            text
        };
        return Ok(CallOutcome::ToolError(message));
    }
    Ok(CallOutcome::Success(output))
}
