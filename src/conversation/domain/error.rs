//! Errors raised while building or committing turns.

use super::Role;
use thiserror::Error;

/// Errors for conversation turns and the conversation log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversationError {
    /// The turn has no content parts.
    #[error("{0} turn must contain at least one content part")]
    EmptyContent(Role),

    /// A part kind is not allowed for the role.
    #[error("{role} turn cannot contain {kind} parts")]
    InvalidPartForRole {
        /// Role of the turn.
        role: Role,
        /// Rejected part kind.
        kind: &'static str,
    },

    /// A text part is blank.
    #[error("{0} turn contains blank text")]
    BlankText(Role),

    /// A tool call lacks an identifier or a name.
    #[error("tool call must have a call id and a name")]
    InvalidToolCall,

    /// A tool-result turn does not hold exactly one result.
    #[error("tool result turn must hold exactly one result, found {0}")]
    ToolResultCount(usize),

    /// Two staged tool calls share a call identifier.
    #[error("tool call id {0} is used more than once")]
    DuplicateToolCall(String),

    /// Staged tool calls were left without a result.
    #[error("tool calls without a result: {}", .0.join(", "))]
    UnresolvedToolCalls(Vec<String>),

    /// A staged result does not answer a staged call, or answers it twice.
    #[error("tool result {0} does not match exactly one pending call")]
    UnmatchedToolResult(String),

    /// The log could not be serialised.
    #[error("failed to serialise conversation: {0}")]
    Serialization(String),
}
