//! The unit of work handed to the router.

use crate::conversation::domain::ToolCallPart;
use serde_json::Value;

/// One tool call to dispatch.
///
/// Lives for a single dispatch. `call_id` ties the eventual result back to
/// the assistant turn that issued the call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Identifier of the call in the requesting assistant turn.
    pub call_id: String,
    /// Tool name as issued by the model, bare or qualified.
    pub tool: String,
    /// JSON arguments.
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(call_id: impl Into<String>, tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            arguments,
        }
    }
}

impl From<&ToolCallPart> for ToolCallRequest {
    fn from(call: &ToolCallPart) -> Self {
        Self::new(call.call_id.clone(), call.name.clone(), call.arguments.clone())
    }
}
