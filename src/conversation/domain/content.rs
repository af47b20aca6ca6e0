//! Content parts carried by conversation turns.
//!
//! A turn holds one or more parts: plain text, tool calls issued by the
//! assistant, or the result of one tool call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single content part within a turn.
///
/// # Serialisation
///
/// Parts are serialised with a `type` tag field:
///
/// ```json
/// { "type": "text", "text": "Hello, world!" }
/// { "type": "tool_call", "call_id": "...", "name": "...", "arguments": {...} }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text content.
    Text(TextPart),
    /// A tool call request from the assistant.
    ToolCall(ToolCallPart),
    /// The result of one tool call.
    ToolResult(ToolResultPart),
}

impl ContentPart {
    /// Convenience constructor for a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextPart::new(text))
    }

    /// Returns the part kind as written in serialised form.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
        }
    }
}

/// Text content within a turn.
///
/// # Examples
///
/// ```
/// use switchboard::conversation::domain::TextPart;
///
/// let text = TextPart::new("Hello, Switchboard!");
/// assert!(!text.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    /// The text content.
    pub text: String,
}

impl TextPart {
    /// Creates a new text part.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns `true` if the text content is empty or whitespace-only.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A tool call request within an assistant turn.
///
/// Each call has an identifier the matching result refers back to.
///
/// # Examples
///
/// ```
/// use switchboard::conversation::domain::ToolCallPart;
/// use serde_json::json;
///
/// let call = ToolCallPart::new("call-123", "filesystem-read_file", json!({"path": "/tmp/a"}));
/// assert!(call.is_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    /// Identifier used to match the result.
    pub call_id: String,
    /// Tool name as issued by the model (bare or qualified).
    pub name: String,
    /// Arguments passed to the tool as JSON.
    pub arguments: Value,
}

impl ToolCallPart {
    /// Creates a new tool call part.
    #[must_use]
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Returns `true` if `call_id` and `name` are non-empty.
    #[must_use]
    #[expect(
        clippy::missing_const_for_fn,
        reason = "String::is_empty is not const-stable"
    )]
    pub fn is_valid(&self) -> bool {
        !self.call_id.is_empty() && !self.name.is_empty()
    }
}

/// The outcome of one tool call, matched to it by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPart {
    /// The `call_id` this result answers.
    pub call_id: String,
    /// Result content: plain text or structured JSON.
    pub content: Value,
    /// Whether the call succeeded.
    #[serde(default = "default_success")]
    pub success: bool,
}

const fn default_success() -> bool {
    true
}

impl ToolResultPart {
    /// Creates a successful result.
    #[must_use]
    pub fn success(call_id: impl Into<String>, content: Value) -> Self {
        Self {
            call_id: call_id.into(),
            content,
            success: true,
        }
    }

    /// Creates a failed result whose content is the error text.
    #[must_use]
    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: Value::String(error.into()),
            success: false,
        }
    }

    /// Returns the content rendered as text.
    #[must_use]
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}
