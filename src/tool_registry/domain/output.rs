//! Successful tool invocation output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of a successful tool invocation.
///
/// `content` holds the server's content items (`{"type": "text", ...}` and
/// friends) untouched; `structured` carries the optional structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    content: Vec<Value>,
    structured: Option<Value>,
}

impl ToolOutput {
    /// Creates an output from raw content items.
    #[must_use]
    pub const fn new(content: Vec<Value>) -> Self {
        Self {
            content,
            structured: None,
        }
    }

    /// Creates an output holding one text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![serde_json::json!({"type": "text", "text": text.into()})])
    }

    /// Attaches a structured result.
    #[must_use]
    pub fn with_structured(mut self, structured: Option<Value>) -> Self {
        self.structured = structured;
        self
    }

    /// Returns the raw content items.
    #[must_use]
    pub fn content(&self) -> &[Value] {
        &self.content
    }

    /// Returns the structured result, if any.
    #[must_use]
    pub const fn structured(&self) -> Option<&Value> {
        self.structured.as_ref()
    }

    /// Concatenates every text item, one per line.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the value recorded in the conversation: the joined text when
    /// every item is text, otherwise the structured result or the raw items.
    #[must_use]
    pub fn to_conversation_value(&self) -> Value {
        let all_text = self
            .content
            .iter()
            .all(|item| item.get("type").and_then(Value::as_str) == Some("text"));
        if all_text && !self.content.is_empty() {
            return Value::String(self.text_content());
        }
        self.structured
            .clone()
            .unwrap_or_else(|| Value::Array(self.content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_items_collapse_to_a_string() {
        let output = ToolOutput::new(vec![
            json!({"type": "text", "text": "first"}),
            json!({"type": "text", "text": "second"}),
        ]);
        assert_eq!(output.to_conversation_value(), json!("first\nsecond"));
    }

    #[test]
    fn mixed_items_prefer_structured_result() {
        let output = ToolOutput::new(vec![json!({"type": "image", "data": "...", "mimeType": "image/png"})])
            .with_structured(Some(json!({"width": 2})));
        assert_eq!(output.to_conversation_value(), json!({"width": 2}));
    }
}
