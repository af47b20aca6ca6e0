//! Offline backend that echoes the conversation back.
//!
//! The latest human message is returned as the answer. A message of the
//! form `***CALL_TOOL <tool> [json arguments]` is turned into a tool call
//! instead, and once the results are in they are echoed as the answer. This
//! lets a session exercise real servers without a model.

use crate::conversation::domain::{Role, ToolCallPart, Turn};
use crate::model::domain::{ModelRequest, ModelResponse};
use crate::model::ports::{ModelBackend, ModelBackendError, ModelBackendResult};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Prefix that turns a human message into a tool call.
pub const CALL_TOOL_PREFIX: &str = "***CALL_TOOL";

/// Backend for offline use and demos.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughModel;

impl PassthroughModel {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelBackend for PassthroughModel {
    async fn complete(&self, request: &ModelRequest) -> ModelBackendResult<ModelResponse> {
        let Some(last) = request.turns.last() else {
            return Err(ModelBackendError::Malformed(
                "no conversation to echo".to_owned(),
            ));
        };
        if last.role() == Role::ToolResult {
            return Ok(ModelResponse::Text(echo_results(request)));
        }
        let text = request
            .turns
            .iter()
            .filter(|turn| turn.role() == Role::Human)
            .last()
            .map(Turn::text)
            .unwrap_or_default();
        parse_call(&text).map_or_else(
            move || Ok(ModelResponse::Text(text)),
            |call| {
                call.map(|part| ModelResponse::ToolCalls {
                    text: None,
                    calls: vec![part],
                })
            },
        )
    }
}

fn echo_results(request: &ModelRequest) -> String {
    let turns: Vec<&Turn> = request.turns.iter().collect();
    let start = turns
        .iter()
        .rposition(|turn| turn.role() != Role::ToolResult)
        .map_or(0, |index| index.saturating_add(1));
    turns
        .iter()
        .skip(start)
        .filter_map(|turn| turn.tool_result())
        .map(|result| result.content_text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses `***CALL_TOOL <tool> [json]`; `None` when the text is not a call.
fn parse_call(text: &str) -> Option<ModelBackendResult<ToolCallPart>> {
    let rest = text.trim().strip_prefix(CALL_TOOL_PREFIX)?;
    let mut pieces = rest.trim().splitn(2, char::is_whitespace);
    let name = pieces.next().filter(|value| !value.is_empty())?;
    let arguments = pieces
        .next()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map_or_else(
            || Ok(Value::Object(serde_json::Map::new())),
            |raw| {
                serde_json::from_str::<Value>(raw).map_err(|err| {
                    ModelBackendError::Malformed(format!("tool call arguments are not JSON: {err}"))
                })
            },
        );
    Some(arguments.map(|value| ToolCallPart::new(format!("call_{}", Uuid::new_v4()), name, value)))
}
