//! Parsed model identifiers of the form `<provider>.<model>`.

use super::ModelSpecError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Model provider named by the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelProvider {
    /// The `OpenAI` chat-completions API.
    OpenAi,
    /// Any OpenAI-compatible endpoint, typically a local runtime.
    Generic,
    /// Offline provider that echoes the latest human message.
    Passthrough,
}

impl ModelProvider {
    /// Returns the identifier prefix for the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Generic => "generic",
            Self::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ModelProvider {
    type Error = ModelSpecError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "generic" => Ok(Self::Generic),
            "passthrough" => Ok(Self::Passthrough),
            _ => Err(ModelSpecError::UnknownProvider(value.to_owned())),
        }
    }
}

/// A validated model identifier.
///
/// The provider is everything before the first `.`; the model name keeps any
/// further dots. A bare `passthrough` needs no model name.
///
/// # Examples
///
/// ```
/// use switchboard::model::domain::{ModelProvider, ModelSpec};
///
/// let spec = ModelSpec::parse("openai.gpt-4.1").expect("valid identifier");
/// assert_eq!(spec.provider(), ModelProvider::OpenAi);
/// assert_eq!(spec.model(), "gpt-4.1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    provider: ModelProvider,
    model: String,
}

impl ModelSpec {
    /// Parses an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ModelSpecError::Empty`] for a blank identifier,
    /// [`ModelSpecError::UnknownProvider`] for an unsupported prefix and
    /// [`ModelSpecError::MissingModel`] when a provider other than
    /// `passthrough` has no model name.
    pub fn parse(raw: &str) -> Result<Self, ModelSpecError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelSpecError::Empty);
        }
        let (prefix, model) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let provider = ModelProvider::try_from(prefix)?;
        let model_name = model.trim();
        if model_name.is_empty() && provider != ModelProvider::Passthrough {
            return Err(ModelSpecError::MissingModel(raw.to_owned()));
        }
        Ok(Self {
            provider,
            model: model_name.to_owned(),
        })
    }

    /// Returns the provider.
    #[must_use]
    pub const fn provider(&self) -> ModelProvider {
        self.provider
    }

    /// Returns the provider-specific model name; empty for a bare
    /// `passthrough`.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.model.is_empty() {
            f.write_str(self.provider.as_str())
        } else {
            write!(f, "{}.{}", self.provider, self.model)
        }
    }
}

impl Serialize for ModelSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
