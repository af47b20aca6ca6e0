//! Domain types for conversation history.
//!
//! Pure value types with no infrastructure dependencies. Turns are immutable
//! after construction and serialisable via serde.

mod content;
mod error;
mod ids;
mod role;
mod turn;

pub use content::{ContentPart, TextPart, ToolCallPart, ToolResultPart};
pub use error::ConversationError;
pub use ids::{SequenceNumber, TurnId};
pub use role::{ParseRoleError, Role};
pub use turn::{Turn, TurnDraft};
