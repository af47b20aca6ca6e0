//! Conversation history for a running session.
//!
//! The log is an ordered, append-only sequence of turns produced by the
//! human, the assistant and tool calls. It is replayed to the model on every
//! request when history is enabled. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Orchestration services in [`services`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use switchboard::conversation::domain::{ContentPart, Role};
//! use switchboard::conversation::services::ConversationState;
//! use mockable::DefaultClock;
//!
//! let mut state = ConversationState::new(Arc::new(DefaultClock));
//! state
//!     .append(Role::Human, vec![ContentPart::text("Hello, Switchboard!")])
//!     .expect("valid turn");
//! assert_eq!(state.snapshot().len(), 1);
//! ```

pub mod domain;
pub mod services;

#[cfg(test)]
mod tests;
