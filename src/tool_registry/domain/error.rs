//! Error types for tool-provider domain validation and parsing.

use super::ServerName;
use thiserror::Error;

/// Errors returned while constructing tool registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistryDomainError {
    /// The server name is empty after trimming.
    #[error("server name must not be empty")]
    EmptyServerName,

    /// The server name contains characters outside `[a-z0-9_]`.
    #[error(
        "server name '{0}' contains invalid characters (only lowercase alphanumeric and underscores allowed)"
    )]
    InvalidServerName(String),

    /// The server name exceeds the 100-character limit.
    #[error("server name exceeds 100 character limit: {0}")]
    ServerNameTooLong(String),

    /// The STDIO command is empty.
    #[error("STDIO command must not be empty")]
    EmptyStdioCommand,

    /// The STDIO working directory is empty after trimming.
    #[error("STDIO working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// The HTTP endpoint URL is empty.
    #[error("HTTP endpoint URL must not be empty")]
    EmptyHttpUrl,

    /// The HTTP endpoint URL does not have an `http://` or `https://` prefix.
    #[error("HTTP endpoint URL '{0}' must start with 'http://' or 'https://'")]
    InvalidHttpUrl(String),

    /// A tool definition name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// A tool input schema is not a JSON object.
    #[error("input schema for tool '{0}' must be a JSON object")]
    InvalidInputSchema(String),

    /// A server advertised the same tool twice.
    #[error("server {server} advertised tool '{tool}' more than once")]
    DuplicateTool {
        /// Owning server.
        server: ServerName,
        /// Repeated tool name.
        tool: String,
    },

    /// Transitioning between two connection states is invalid.
    #[error("invalid connection state transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Current connection state.
        from: String,
        /// Requested target connection state.
        to: String,
    },
}

/// Error returned while parsing a connection status from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown connection status: {0}")]
pub struct ParseConnectionStatusError(pub String);

/// Error returned while parsing a health status from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown server health status: {0}")]
pub struct ParseHealthStatusError(pub String);
