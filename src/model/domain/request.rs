//! Payloads exchanged with a model backend.

use super::ModelSpec;
use crate::conversation::domain::ToolCallPart;
use crate::conversation::services::ConversationSnapshot;
use crate::tool_registry::domain::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Name the model uses to call the tool.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the arguments.
    pub input_schema: Value,
}

impl ToolSchema {
    /// Creates a schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

impl From<&ToolDescriptor> for ToolSchema {
    fn from(tool: &ToolDescriptor) -> Self {
        let definition = tool.definition();
        Self {
            name: tool.qualified_name(),
            description: definition.description().unwrap_or_default().to_owned(),
            input_schema: definition.input_schema().clone(),
        }
    }
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Model to run.
    pub model: ModelSpec,
    /// Rendered system instruction.
    pub instruction: String,
    /// Conversation turns sent as context.
    pub turns: ConversationSnapshot,
    /// Tools the model may call.
    pub tools: Vec<ToolSchema>,
}

/// What the model produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    /// A final text answer for the human.
    Text(String),
    /// A request to run tools before answering.
    ToolCalls {
        /// Optional text emitted alongside the calls.
        text: Option<String>,
        /// Calls in the order the model issued them.
        calls: Vec<ToolCallPart>,
    },
}

impl ModelResponse {
    /// Returns the tool calls, empty for a text answer.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCallPart] {
        match self {
            Self::Text(_) => &[],
            Self::ToolCalls { calls, .. } => calls.as_slice(),
        }
    }
}
