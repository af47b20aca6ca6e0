//! Model backend adapters.
//!
//! - [`openai`]: OpenAI-compatible chat completions over HTTP
//! - [`passthrough`]: offline echo backend
//! - [`scripted`]: queued responses for tests

pub mod openai;
pub mod passthrough;
pub mod scripted;

pub use openai::{OpenAiBackend, OpenAiConfig};
pub use passthrough::PassthroughModel;
pub use scripted::ScriptedModel;

use crate::model::domain::{ModelProvider, ModelSpec};
use crate::model::ports::{ModelBackend, ModelBackendError, ModelBackendResult};
use std::sync::Arc;

/// Endpoint settings for every HTTP provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Settings for `openai.*` models.
    pub openai: OpenAiConfig,
    /// Settings for `generic.*` models.
    pub generic: OpenAiConfig,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai: OpenAiConfig::openai(None),
            generic: OpenAiConfig::generic(),
        }
    }
}

/// Builds the backend for a model identifier.
///
/// # Errors
///
/// Returns [`ModelBackendError::NotConfigured`] when an `openai` model is
/// requested without an API key, or a transport error if the HTTP client
/// cannot be built.
pub fn backend_for(
    spec: &ModelSpec,
    settings: &ProviderSettings,
) -> ModelBackendResult<Arc<dyn ModelBackend>> {
    match spec.provider() {
        ModelProvider::Passthrough => Ok(Arc::new(PassthroughModel::new())),
        ModelProvider::OpenAi => {
            if settings.openai.api_key.as_deref().is_none_or(str::is_empty) {
                return Err(ModelBackendError::NotConfigured(
                    "OPENAI_API_KEY is not set".to_owned(),
                ));
            }
            Ok(Arc::new(OpenAiBackend::new(settings.openai.clone())?))
        }
        ModelProvider::Generic => Ok(Arc::new(OpenAiBackend::new(settings.generic.clone())?)),
    }
}
