//! Application services for conversation history.
//!
//! The session owns one [`ConversationState`] and is its only writer.

mod state;

pub use state::{ConversationSnapshot, ConversationState, StagedExchange};
