//! The Turn value: one unit of conversation history.

use super::{ContentPart, ConversationError, Role, SequenceNumber, ToolCallPart, ToolResultPart, TurnId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// A committed turn.
///
/// Turns are immutable once created.
///
/// # Invariants
///
/// - Human turns hold only non-blank text.
/// - Assistant turns hold text and/or valid tool calls.
/// - Tool-result turns hold exactly one tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: Vec<ContentPart>,
    sequence_number: SequenceNumber,
    created_at: DateTime<Utc>,
}

impl Turn {
    /// Validates `content` for `role` and stamps the turn.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversationError`] when the content violates the role's
    /// rules.
    pub fn new(
        role: Role,
        content: Vec<ContentPart>,
        sequence_number: SequenceNumber,
        clock: &dyn Clock,
    ) -> Result<Self, ConversationError> {
        validate_content(role, &content)?;
        Ok(Self {
            id: TurnId::new(),
            role,
            content,
            sequence_number,
            created_at: clock.utc(),
        })
    }

    /// Returns the turn identifier.
    #[must_use]
    pub const fn id(&self) -> TurnId {
        self.id
    }

    /// Returns who produced the turn.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the content parts.
    #[must_use]
    pub fn content(&self) -> &[ContentPart] {
        &self.content
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns every text part joined by blank lines.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.text.as_str()),
                ContentPart::ToolCall(_) | ContentPart::ToolResult(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Iterates over the tool calls in this turn.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolCall(call) => Some(call),
            ContentPart::Text(_) | ContentPart::ToolResult(_) => None,
        })
    }

    /// Returns the tool result of a tool-result turn.
    #[must_use]
    pub fn tool_result(&self) -> Option<&ToolResultPart> {
        self.content.iter().find_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result),
            ContentPart::Text(_) | ContentPart::ToolCall(_) => None,
        })
    }
}

/// A turn waiting to be committed; it has no sequence number yet.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnDraft {
    role: Role,
    content: Vec<ContentPart>,
}

impl TurnDraft {
    /// Validates a draft.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversationError`] when the content violates the role's
    /// rules.
    pub fn new(role: Role, content: Vec<ContentPart>) -> Result<Self, ConversationError> {
        validate_content(role, &content)?;
        Ok(Self { role, content })
    }

    /// Returns the role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the content parts.
    #[must_use]
    pub fn content(&self) -> &[ContentPart] {
        &self.content
    }

    pub(crate) fn into_parts(self) -> (Role, Vec<ContentPart>) {
        (self.role, self.content)
    }
}

fn validate_content(role: Role, content: &[ContentPart]) -> Result<(), ConversationError> {
    if content.is_empty() {
        return Err(ConversationError::EmptyContent(role));
    }
    match role {
        Role::Human => content.iter().try_for_each(|part| match part {
            ContentPart::Text(text) if text.is_empty() => Err(ConversationError::BlankText(role)),
            ContentPart::Text(_) => Ok(()),
            other => Err(ConversationError::InvalidPartForRole {
                role,
                kind: other.kind(),
            }),
        }),
        Role::Assistant => content.iter().try_for_each(|part| match part {
            ContentPart::Text(_) => Ok(()),
            ContentPart::ToolCall(call) if call.is_valid() => Ok(()),
            ContentPart::ToolCall(_) => Err(ConversationError::InvalidToolCall),
            ContentPart::ToolResult(_) => Err(ConversationError::InvalidPartForRole {
                role,
                kind: "tool_result",
            }),
        }),
        Role::ToolResult => {
            if content.len() != 1 {
                return Err(ConversationError::ToolResultCount(content.len()));
            }
            content.iter().try_for_each(|part| match part {
                ContentPart::ToolResult(_) => Ok(()),
                other => Err(ConversationError::InvalidPartForRole {
                    role,
                    kind: other.kind(),
                }),
            })
        }
    }
}
