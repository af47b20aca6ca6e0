//! Port for language-model backends.

use crate::model::domain::{ModelRequest, ModelResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for model backend operations.
pub type ModelBackendResult<T> = Result<T, ModelBackendError>;

/// A language-model backend.
///
/// Backends are stateless between calls: every request carries the full
/// context the model should see.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Runs one completion.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelBackendError`] when the backend cannot be reached,
    /// reports an error or answers with something unparseable.
    async fn complete(&self, request: &ModelRequest) -> ModelBackendResult<ModelResponse>;
}

/// Errors returned by model backends. All of them are recoverable: the
/// session reports them and waits for the next human message.
#[derive(Debug, Clone, Error)]
pub enum ModelBackendError {
    /// The backend did not answer in time.
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be delivered.
    #[error("model transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),

    /// The backend answered with an error status.
    #[error("model backend returned {status}: {message}")]
    Backend {
        /// HTTP status code or provider error code.
        status: u16,
        /// Error text reported by the backend.
        message: String,
    },

    /// The answer could not be interpreted.
    #[error("malformed model response: {0}")]
    Malformed(String),

    /// The backend is missing required configuration.
    #[error("model backend is not configured: {0}")]
    NotConfigured(String),

    /// A scripted backend has no responses left.
    #[error("scripted model has no responses left")]
    Exhausted,
}

impl ModelBackendError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
