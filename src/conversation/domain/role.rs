//! Who produced a turn.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Source of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the human.
    Human,
    /// Model output: text, tool calls, or both.
    Assistant,
    /// The result of one tool call.
    ToolResult,
}

impl Role {
    /// Returns the canonical text representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
            Self::ToolResult => "tool_result",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl TryFrom<&str> for Role {
    type Error = ParseRoleError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "human" | "user" => Ok(Self::Human),
            "assistant" => Ok(Self::Assistant),
            "tool_result" | "tool" => Ok(Self::ToolResult),
            _ => Err(ParseRoleError(value.to_owned())),
        }
    }
}
