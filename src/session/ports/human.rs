//! Port for the human side of a session.

use crate::session::domain::{HumanInput, SessionEvent};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Reads human input and displays session output.
///
/// Reads are cooperative suspension points: the session may drop a pending
/// read when it is cancelled.
#[async_trait]
pub trait HumanInterface: Send + Sync {
    /// Waits for the next line of input.
    ///
    /// # Errors
    ///
    /// Returns a [`HumanInterfaceError`] when input cannot be read.
    async fn read_input(&self, prompt: &str) -> Result<HumanInput, HumanInterfaceError>;

    /// Shows an event to the human.
    ///
    /// # Errors
    ///
    /// Returns a [`HumanInterfaceError`] when output cannot be written.
    async fn display(&self, event: &SessionEvent) -> Result<(), HumanInterfaceError>;
}

/// Errors returned by human interfaces.
#[derive(Debug, Clone, Error)]
pub enum HumanInterfaceError {
    /// Reading or writing failed.
    #[error("console I/O error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),

    /// The interface has no more input and cannot signal an end.
    #[error("human interface closed")]
    Closed,
}

impl HumanInterfaceError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}
