//! Error types for model identifier parsing.

use thiserror::Error;

/// Errors returned while parsing a model identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelSpecError {
    /// The identifier is empty after trimming.
    #[error("model identifier must not be empty")]
    Empty,

    /// The provider prefix is not one this crate can talk to.
    #[error("unknown model provider '{0}' (expected openai, generic or passthrough)")]
    UnknownProvider(String),

    /// A provider was named without a model after the dot.
    #[error("model identifier '{0}' names a provider but no model")]
    MissingModel(String),
}
