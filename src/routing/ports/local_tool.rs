//! Port for tools served in-process rather than by a server.

use crate::model::domain::ToolSchema;
use crate::tool_registry::domain::ToolOutput;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A tool the router answers itself.
///
/// Local tools are matched by exact name before any server lookup, so their
/// names must not collide with qualified server tool names.
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// Returns the schema offered to the model.
    fn schema(&self) -> ToolSchema;

    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Returns a [`LocalToolError`] when the arguments are invalid or the
    /// tool cannot complete.
    async fn call(&self, arguments: &Value) -> Result<ToolOutput, LocalToolError>;
}

/// Errors returned by local tools.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalToolError {
    /// The arguments do not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran but could not produce a result.
    #[error("{0}")]
    Failed(String),

    /// The human ended the session instead of answering.
    #[error("the human ended the session")]
    SessionEnded,
}
