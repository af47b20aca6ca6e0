//! Errors that end a session.

use super::{InstructionError, SessionState};
use crate::conversation::domain::ConversationError;
use crate::session::ports::HumanInterfaceError;
use crate::tool_registry::services::ConnectionError;
use thiserror::Error;

/// Errors that terminate the session loop.
///
/// Per-call and per-server failures never show up here: they become failed
/// tool results or notices and the session carries on.
#[derive(Debug, Clone, Error)]
pub enum SessionFatalError {
    /// The pool could not be built at startup.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Every configured server is closed.
    #[error("no live servers remain; every configured server connection is closed")]
    NoLiveServers,

    /// The human interface failed.
    #[error("human interface failed: {0}")]
    HumanInterface(#[from] HumanInterfaceError),

    /// The conversation log rejected a write.
    #[error("conversation corrupted: {0}")]
    Conversation(#[from] ConversationError),

    /// The instruction template is invalid.
    #[error(transparent)]
    Instruction(#[from] InstructionError),

    /// The loop attempted an invalid state change.
    #[error("invalid session state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },
}
