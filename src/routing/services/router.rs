//! Dispatch of model tool calls to the server that owns them.

use crate::conversation::domain::ToolResultPart;
use crate::model::domain::ToolSchema;
use crate::routing::domain::ToolCallRequest;
use crate::routing::ports::{LocalTool, LocalToolError};
use crate::tool_registry::domain::{ServerName, ToolOutput};
use crate::tool_registry::services::{ConnectionPool, InvokeError, ToolResolution};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};

/// Default time allowed for one tool invocation, retries included.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while routing one tool call.
///
/// Every variant is contained to its call: the session turns it into a
/// failed tool result the model can read. The one exception is a local tool
/// reporting [`LocalToolError::SessionEnded`], see
/// [`ends_session`](Self::ends_session).
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// No `Ready` server serves the name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Several `Ready` servers serve the bare name.
    #[error("tool {tool} is served by several servers ({}); use a qualified name such as {}",
        list(.servers), example(.tool, .servers))]
    AmbiguousTool {
        /// Tool name as issued.
        tool: String,
        /// Servers serving it.
        servers: Vec<ServerName>,
    },

    /// The owning server failed the call.
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// A local tool failed.
    #[error("tool {tool} failed: {source}")]
    LocalToolFailed {
        /// Tool name.
        tool: String,
        /// Failure reported by the tool.
        source: LocalToolError,
    },
}

impl RouteError {
    /// Returns whether the call asked for the whole session to end.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(
            self,
            Self::LocalToolFailed {
                source: LocalToolError::SessionEnded,
                ..
            }
        )
    }
}

fn list(servers: &[ServerName]) -> String {
    servers
        .iter()
        .map(ServerName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn example(tool: &str, servers: &[ServerName]) -> String {
    servers
        .first()
        .map_or_else(|| tool.to_owned(), |server| format!("{server}-{tool}"))
}

/// Routes tool calls to local tools or to the pool.
pub struct ToolRouter {
    pool: Arc<ConnectionPool>,
    local: BTreeMap<String, Arc<dyn LocalTool>>,
    timeout: Duration,
}

impl ToolRouter {
    /// Creates a router over `pool` with a per-invocation `timeout`.
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>, timeout: Duration) -> Self {
        Self {
            pool,
            local: BTreeMap::new(),
            timeout,
        }
    }

    /// Registers a local tool under its schema name.
    #[must_use]
    pub fn with_local_tool(mut self, tool: Arc<dyn LocalTool>) -> Self {
        self.local.insert(tool.schema().name, tool);
        self
    }

    /// Returns the pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Returns the per-invocation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the tools to offer the model: local tools first, then every
    /// tool served by a `Ready` server under its qualified name.
    #[must_use]
    pub fn available_tools(&self) -> Vec<ToolSchema> {
        self.local
            .values()
            .map(|tool| tool.schema())
            .chain(self.pool.tools().iter().map(ToolSchema::from))
            .collect()
    }

    /// Dispatches one call.
    ///
    /// Resolution never waits on a server: unknown and ambiguous names fail
    /// straight away.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::UnknownTool`] or [`RouteError::AmbiguousTool`]
    /// when the name does not pick exactly one server, and the server's or
    /// local tool's failure otherwise.
    pub async fn dispatch(&self, request: &ToolCallRequest) -> Result<ToolOutput, RouteError> {
        let span = info_span!("dispatch", call_id = %request.call_id, tool = %request.tool);
        self.route(request).instrument(span).await
    }

    async fn route(&self, request: &ToolCallRequest) -> Result<ToolOutput, RouteError> {
        if let Some(local) = self.local.get(&request.tool) {
            info!("dispatching to local tool");
            return local
                .call(&request.arguments)
                .await
                .map_err(|source| RouteError::LocalToolFailed {
                    tool: request.tool.clone(),
                    source,
                });
        }
        match self.pool.resolve(&request.tool) {
            ToolResolution::Found(resolved) => {
                let connection = resolved.connection();
                info!(server = %connection.name(), "dispatching tool call");
                Ok(connection
                    .invoke(resolved.tool().name(), &request.arguments, self.timeout)
                    .await?)
            }
            ToolResolution::Ambiguous(servers) => Err(RouteError::AmbiguousTool {
                tool: request.tool.clone(),
                servers,
            }),
            ToolResolution::Unknown => Err(RouteError::UnknownTool(request.tool.clone())),
        }
    }

    /// Dispatches every call of one model turn concurrently and returns
    /// each outcome in request order.
    pub async fn dispatch_all(
        &self,
        requests: &[ToolCallRequest],
    ) -> Vec<Result<ToolOutput, RouteError>> {
        join_all(requests.iter().map(|request| self.dispatch(request))).await
    }

    /// Dispatches every call of one model turn concurrently.
    ///
    /// Results come back in request order whatever order the calls finish
    /// in. A failed call becomes a failed result carrying the error text; it
    /// never aborts the batch.
    pub async fn dispatch_batch(&self, requests: &[ToolCallRequest]) -> Vec<ToolResultPart> {
        let outcomes = self.dispatch_all(requests).await;
        requests
            .iter()
            .zip(outcomes)
            .map(|(request, outcome)| result_part(request, outcome))
            .collect()
    }
}

/// Turns one routed outcome into the result recorded for its call.
#[must_use]
pub fn result_part(
    request: &ToolCallRequest,
    outcome: Result<ToolOutput, RouteError>,
) -> ToolResultPart {
    match outcome {
        Ok(output) => {
            ToolResultPart::success(request.call_id.clone(), output.to_conversation_value())
        }
        Err(err) => {
            warn!(call_id = %request.call_id, tool = %request.tool, error = %err, "tool call failed");
            ToolResultPart::failure(request.call_id.clone(), err.to_string())
        }
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("pool", &self.pool)
            .field("local", &self.local.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}
