//! What the session shows the human and what it reads back.

use serde_json::Value;

/// One line of human input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanInput {
    /// Text typed by the human.
    Message(String),
    /// The human ended the session (end of input or an explicit signal).
    EndSession,
}

/// Something the session reports to the human.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Text produced by the model.
    AssistantText(String),
    /// A tool call about to be dispatched.
    ToolCall {
        /// Call identifier.
        call_id: String,
        /// Tool name as issued.
        tool: String,
        /// Arguments.
        arguments: Value,
    },
    /// The outcome of one tool call.
    ToolResult {
        /// Call identifier.
        call_id: String,
        /// Whether the call succeeded.
        success: bool,
        /// Result or error text.
        content: String,
    },
    /// Informational output, such as command results.
    Notice(String),
    /// A recoverable error.
    Error(String),
}
