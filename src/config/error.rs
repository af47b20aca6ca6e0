//! Errors raised while loading settings.

use crate::model::domain::ModelSpecError;
use crate::tool_registry::domain::ToolRegistryDomainError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors for the settings file and the values derived from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid YAML for this schema.
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configured model identifier is invalid.
    #[error("invalid model identifier: {0}")]
    Model(#[from] ModelSpecError),

    /// A server entry could not be turned into a descriptor.
    #[error("invalid server '{name}': {source}")]
    Server {
        /// Server key in the settings file.
        name: String,
        /// Validation failure.
        #[source]
        source: ToolRegistryDomainError,
    },

    /// A stdio server has no command.
    #[error("server '{0}' uses the stdio transport but has no command")]
    MissingCommand(String),

    /// An HTTP server has no URL.
    #[error("server '{0}' uses the http transport but has no url")]
    MissingUrl(String),

    /// The agent names a server that is not configured.
    #[error("agent refers to server '{0}', which is not configured under mcp.servers")]
    UnknownServer(String),

    /// The logger level is not one tracing understands.
    #[error("unknown log level '{0}' (expected trace, debug, info, warn or error)")]
    InvalidLogLevel(String),
}
