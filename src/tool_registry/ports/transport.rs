//! Transport port: the wire-level contract with one tool-provider server.

use crate::tool_registry::domain::{ServerDescriptor, ServerInfo, ToolDefinition, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// What a server reports in its `initialize` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeOutcome {
    /// Protocol version the server agreed to.
    pub protocol_version: String,
    /// Server implementation identity.
    pub server_info: Option<ServerInfo>,
    /// Optional usage instructions for the model.
    pub instructions: Option<String>,
}

/// One page of a paginated tool listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPage {
    /// Tools on this page.
    pub tools: Vec<ToolDefinition>,
    /// Cursor for the next page, if there is one.
    pub next_cursor: Option<String>,
}

/// Result of a `tools/call` request that reached the tool.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The tool ran and produced output.
    Success(ToolOutput),
    /// The tool ran and reported an error of its own.
    ToolError(String),
}

/// Open connection to one server.
///
/// Implementations must support concurrent requests: the router issues
/// several calls to the same server within one batch.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Performs the protocol handshake (`initialize` followed by the
    /// `initialized` notification).
    async fn initialize(&self) -> TransportResult<InitializeOutcome>;

    /// Fetches one page of tools.
    async fn list_tools(&self, cursor: Option<&str>) -> TransportResult<ToolPage>;

    /// Calls a tool by its bare name.
    async fn call_tool(&self, name: &str, arguments: &Value) -> TransportResult<CallOutcome>;

    /// Sends a liveness probe.
    async fn ping(&self) -> TransportResult<()>;

    /// Releases the underlying process or session.
    async fn close(&self) -> TransportResult<()>;
}

/// Opens transports for configured servers.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a fresh transport for `descriptor`. No handshake is performed.
    async fn open(&self, descriptor: &ServerDescriptor) -> TransportResult<Arc<dyn ToolTransport>>;
}

/// Errors returned by transport adapters.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A transient I/O failure; the request may be retried.
    #[error("transport I/O failure: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),

    /// The peer went away (process exited, stream closed, session expired).
    #[error("server disconnected: {0}")]
    Disconnected(String),

    /// The server answered with a JSON-RPC error.
    #[error("server returned error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },

    /// The server violated the protocol; the stream can no longer be trusted.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The transport cannot be opened with the given parameters.
    #[error("unsupported transport: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Wraps an I/O-level failure.
    #[must_use]
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }

    /// Wraps a protocol violation.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns whether the connection is unusable until reopened.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Returns whether the connection must be closed for good.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Unsupported(_))
    }
}
