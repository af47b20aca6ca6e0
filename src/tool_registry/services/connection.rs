//! One live connection to a tool-provider server.

use crate::SharedClock;
use crate::tool_registry::domain::{
    CapabilitySet, ConnectionId, ConnectionStatus, HealthSnapshot, ServerDescriptor, ServerName,
    ToolDefinition, ToolDescriptor, ToolOutput, ToolRegistryDomainError,
};
use crate::tool_registry::ports::{CallOutcome, ToolTransport, TransportConnector, TransportError};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on `tools/list` pages fetched in one discovery.
const MAX_TOOL_PAGES: usize = 64;

/// Retry and time-limit behaviour for requests to one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    handshake_timeout: Duration,
}

impl RetryPolicy {
    /// Default bound on a handshake, a tool refresh or a ping.
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a policy. At least one attempt is always made.
    #[must_use]
    pub const fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            initial_backoff,
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Bounds each handshake, tool refresh and ping by `timeout`.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the total number of attempts per call.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the bound on handshakes, refreshes and pings.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Returns the delay before retrying after failed attempt `attempt`
    /// (1-based). The delay doubles with each attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// Errors raised while opening a connection or discovering its tools.
#[derive(Debug, Clone, Error)]
pub enum HandshakeError {
    /// The transport failed during the handshake.
    #[error("handshake with {server} failed: {source}")]
    Transport {
        /// Server being contacted.
        server: ServerName,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },

    /// The server advertised an invalid tool set.
    #[error("server {server} advertised invalid tools: {source}")]
    Discovery {
        /// Server being contacted.
        server: ServerName,
        /// Validation failure.
        #[source]
        source: ToolRegistryDomainError,
    },

    /// The server did not finish the exchange in time.
    #[error("server {server} did not answer within {}ms", timeout.as_millis())]
    Timeout {
        /// Server being contacted.
        server: ServerName,
        /// Limit that elapsed.
        timeout: Duration,
    },

    /// The connection was closed and cannot be reopened.
    #[error("connection to {0} is closed")]
    Closed(ServerName),

    /// The connection is not in a state that allows the operation.
    #[error("connection to {server} is {status}")]
    InvalidState {
        /// Server being contacted.
        server: ServerName,
        /// Current status.
        status: ConnectionStatus,
    },
}

/// Errors raised by a tool invocation.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The connection is not `Ready`; nothing was sent.
    #[error("server {server} is {status}, not ready")]
    NotReady {
        /// Target server.
        server: ServerName,
        /// Status at call time.
        status: ConnectionStatus,
    },

    /// The call did not finish within its timeout.
    #[error("tool {tool} on {server} timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Target server.
        server: ServerName,
        /// Tool name.
        tool: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The tool ran and reported an error.
    #[error("tool {tool} on {server} failed: {message}")]
    ToolFailed {
        /// Target server.
        server: ServerName,
        /// Tool name.
        tool: String,
        /// Tool-supplied message.
        message: String,
    },

    /// The server rejected the request.
    #[error("server {server} rejected {tool} (code {code}): {message}")]
    Remote {
        /// Target server.
        server: ServerName,
        /// Tool name.
        tool: String,
        /// JSON-RPC error code.
        code: i64,
        /// Server-supplied message.
        message: String,
    },

    /// The transport failed and retries did not help.
    #[error("transport to {server} failed during {tool}: {source}")]
    Transport {
        /// Target server.
        server: ServerName,
        /// Tool name.
        tool: String,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },
}

struct ConnectionInner {
    status: ConnectionStatus,
    connection_id: ConnectionId,
    transport: Option<Arc<dyn ToolTransport>>,
    capabilities: Option<CapabilitySet>,
    health: HealthSnapshot,
}

/// A connection to one configured server.
///
/// The connection owns its transport. Status changes follow
/// [`ConnectionStatus::can_transition_to`]; a `Closed` connection never
/// reopens. Failures observed on a superseded transport (one replaced by a
/// reconnect) do not affect the current one.
pub struct ServerConnection {
    descriptor: ServerDescriptor,
    connector: Arc<dyn TransportConnector>,
    clock: SharedClock,
    policy: RetryPolicy,
    inner: RwLock<ConnectionInner>,
}

impl ServerConnection {
    /// Creates a connection in the `Connecting` state. Call
    /// [`handshake`](Self::handshake) to open it.
    #[must_use]
    pub fn new(
        descriptor: ServerDescriptor,
        connector: Arc<dyn TransportConnector>,
        clock: SharedClock,
        policy: RetryPolicy,
    ) -> Self {
        let health = HealthSnapshot::unknown(clock.utc());
        Self {
            descriptor,
            connector,
            clock,
            policy,
            inner: RwLock::new(ConnectionInner {
                status: ConnectionStatus::Connecting,
                connection_id: ConnectionId::new(),
                transport: None,
                capabilities: None,
                health,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ConnectionInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConnectionInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        self.descriptor.name()
    }

    /// Returns the configuration this connection was built from.
    #[must_use]
    pub const fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.read().status
    }

    /// Returns the identifier of the current transport generation.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.read().connection_id
    }

    /// Returns the most recent health snapshot.
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        self.read().health.clone()
    }

    /// Returns the capability set learned by the last successful discovery.
    #[must_use]
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        self.read().capabilities.clone()
    }

    /// Returns the tools this connection can serve right now.
    ///
    /// Only `Ready` connections serve tools; other states return nothing.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        let inner = self.read();
        if !inner.status.is_routable() {
            return Vec::new();
        }
        inner
            .capabilities
            .as_ref()
            .map(|caps| caps.tools().to_vec())
            .unwrap_or_default()
    }

    /// Returns the descriptor of tool `name` when this connection is `Ready`
    /// and serves it.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<ToolDescriptor> {
        let inner = self.read();
        if !inner.status.is_routable() {
            return None;
        }
        inner.capabilities.as_ref()?.tool(name).cloned()
    }

    /// Opens the transport, performs the handshake and discovers tools.
    ///
    /// On success the connection becomes `Ready`. On failure it becomes
    /// `Degraded` and any opened transport is released. The whole exchange
    /// is bounded by [`RetryPolicy::handshake_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidState`] unless the connection is
    /// `Connecting`, [`HandshakeError::Timeout`] when the server is too slow,
    /// and transport or discovery errors otherwise.
    pub async fn handshake(&self) -> Result<CapabilitySet, HandshakeError> {
        let (status, connection_id) = {
            let inner = self.read();
            (inner.status, inner.connection_id)
        };
        if status != ConnectionStatus::Connecting {
            return Err(self.state_error(status));
        }

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.policy.handshake_timeout();
        let opened = match tokio::time::timeout_at(deadline, self.connector.open(&self.descriptor))
            .await
        {
            Ok(opened) => opened.map_err(|source| HandshakeError::Transport {
                server: self.name().clone(),
                source,
            }),
            Err(_) => Err(self.handshake_timed_out()),
        };
        let transport = match opened {
            Ok(transport) => transport,
            Err(error) => {
                self.mark_failed(connection_id, &error.to_string());
                return Err(error);
            }
        };

        let discovered = tokio::time::timeout_at(deadline, self.discover(transport.as_ref()))
            .await
            .unwrap_or_else(|_| Err(self.handshake_timed_out()));
        let capabilities = match discovered {
            Ok(capabilities) => capabilities,
            Err(error) => {
                self.release(transport).await;
                self.mark_failed(connection_id, &error.to_string());
                return Err(error);
            }
        };

        let round_trip = started.elapsed();
        let accepted = {
            let mut inner = self.write();
            if inner.status == ConnectionStatus::Connecting && inner.connection_id == connection_id
            {
                inner.status = ConnectionStatus::Ready;
                inner.transport = Some(Arc::clone(&transport));
                inner.capabilities = Some(capabilities.clone());
                inner.health = HealthSnapshot::healthy(self.clock.utc(), round_trip);
                true
            } else {
                false
            }
        };
        if !accepted {
            self.release(transport).await;
            return Err(HandshakeError::Closed(self.name().clone()));
        }

        info!(
            server = %self.name(),
            transport = self.descriptor.transport().kind(),
            tools = capabilities.tools().len(),
            elapsed_ms = round_trip.as_millis(),
            "server connected"
        );
        Ok(capabilities)
    }

    /// Re-lists the tools of a `Ready` connection.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidState`] unless the connection is
    /// `Ready`, [`HandshakeError::Timeout`] when the listing is too slow, and
    /// transport or discovery errors otherwise. A disconnect during the
    /// listing degrades the connection; a timeout leaves it `Ready`.
    pub async fn refresh(&self) -> Result<CapabilitySet, HandshakeError> {
        let (transport, connection_id, previous) = {
            let inner = self.read();
            match (&inner.transport, &inner.capabilities) {
                (Some(transport), Some(previous)) if inner.status.is_routable() => (
                    Arc::clone(transport),
                    inner.connection_id,
                    previous.clone(),
                ),
                _ => return Err(self.state_error(inner.status)),
            }
        };

        let limit = self.policy.handshake_timeout();
        let listed = tokio::time::timeout(limit, self.list_all_tools(transport.as_ref()))
            .await
            .map_err(|_| self.handshake_timed_out())?;
        let definitions = match listed {
            Ok(definitions) => definitions,
            Err(source) => {
                if !source.is_transient() {
                    self.retire(connection_id, target_for(&source), &source.to_string())
                        .await;
                }
                return Err(HandshakeError::Transport {
                    server: self.name().clone(),
                    source,
                });
            }
        };

        let capabilities = CapabilitySet::from_discovery(
            &self.descriptor,
            previous.protocol_version(),
            previous.server_info().cloned(),
            definitions,
        )
        .map_err(|source| HandshakeError::Discovery {
            server: self.name().clone(),
            source,
        })?
        .with_instructions(previous.instructions().map(str::to_owned));

        let mut inner = self.write();
        if inner.connection_id == connection_id && inner.status.is_routable() {
            inner.capabilities = Some(capabilities.clone());
        }
        drop(inner);
        debug!(server = %self.name(), tools = capabilities.tools().len(), "tools refreshed");
        Ok(capabilities)
    }

    /// Drops the current transport and performs a fresh handshake.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Closed`] for closed connections,
    /// [`HandshakeError::InvalidState`] while another handshake is running,
    /// and handshake errors otherwise.
    pub async fn reconnect(&self) -> Result<CapabilitySet, HandshakeError> {
        let previous = {
            let mut inner = self.write();
            match inner.status {
                ConnectionStatus::Closed => return Err(HandshakeError::Closed(self.name().clone())),
                ConnectionStatus::Connecting => return Err(self.state_error(inner.status)),
                ConnectionStatus::Ready | ConnectionStatus::Degraded => {}
            }
            inner.status = ConnectionStatus::Connecting;
            inner.connection_id = ConnectionId::new();
            inner.capabilities = None;
            inner.transport.take()
        };

        info!(server = %self.name(), "reconnecting");
        if let Some(transport) = previous {
            self.release(transport).await;
        }
        self.handshake().await
    }

    /// Calls tool `tool` with `arguments`.
    ///
    /// Transient transport failures are retried with exponential backoff
    /// according to the [`RetryPolicy`]. The whole call, retries included,
    /// is bounded by `timeout`. A timeout leaves the connection `Ready`; a
    /// disconnect or exhausted retries degrade it; a protocol violation
    /// closes it.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::NotReady`] without contacting the server when
    /// the connection is not `Ready`, and the call's failure otherwise.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: &Value,
        timeout: Duration,
    ) -> Result<ToolOutput, InvokeError> {
        let (transport, connection_id) = {
            let inner = self.read();
            match &inner.transport {
                Some(transport) if inner.status.is_routable() => {
                    (Arc::clone(transport), inner.connection_id)
                }
                _ => {
                    return Err(InvokeError::NotReady {
                        server: self.name().clone(),
                        status: inner.status,
                    });
                }
            }
        };

        let call = self.call_with_retry(transport.as_ref(), connection_id, tool, arguments);
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or_else(|_| {
                warn!(server = %self.name(), tool, timeout_ms = timeout.as_millis(), "tool call timed out");
                Err(InvokeError::Timeout {
                    server: self.name().clone(),
                    tool: tool.to_owned(),
                    timeout,
                })
            })
    }

    async fn call_with_retry(
        &self,
        transport: &dyn ToolTransport,
        connection_id: ConnectionId,
        tool: &str,
        arguments: &Value,
    ) -> Result<ToolOutput, InvokeError> {
        let mut attempt: u32 = 1;
        loop {
            match transport.call_tool(tool, arguments).await {
                Ok(CallOutcome::Success(output)) => return Ok(output),
                Ok(CallOutcome::ToolError(message)) => {
                    return Err(InvokeError::ToolFailed {
                        server: self.name().clone(),
                        tool: tool.to_owned(),
                        message,
                    });
                }
                Err(TransportError::Remote { code, message }) => {
                    return Err(InvokeError::Remote {
                        server: self.name().clone(),
                        tool: tool.to_owned(),
                        code,
                        message,
                    });
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts() => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        server = %self.name(),
                        tool,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "transient tool call failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => {
                    self.retire(connection_id, target_for(&err), &err.to_string())
                        .await;
                    return Err(InvokeError::Transport {
                        server: self.name().clone(),
                        tool: tool.to_owned(),
                        source: err,
                    });
                }
            }
        }
    }

    /// Probes the server and records a fresh health snapshot.
    ///
    /// Connections that are not `Ready` are reported unhealthy without
    /// contacting the server. A ping that outlasts
    /// [`RetryPolicy::handshake_timeout`] is recorded as unhealthy and leaves
    /// the status unchanged.
    pub async fn ping(&self) -> HealthSnapshot {
        let (status, transport, connection_id) = {
            let inner = self.read();
            (inner.status, inner.transport.clone(), inner.connection_id)
        };
        let checked_at = self.clock.utc();
        let Some(transport) = transport.filter(|_| status.is_routable()) else {
            let snapshot = if status == ConnectionStatus::Connecting {
                HealthSnapshot::unknown(checked_at)
            } else {
                HealthSnapshot::unhealthy(checked_at, format!("connection is {status}"))
            };
            self.record_health(connection_id, snapshot.clone());
            return snapshot;
        };

        let started = Instant::now();
        let limit = self.policy.handshake_timeout();
        let Ok(answered) = tokio::time::timeout(limit, transport.ping()).await else {
            let snapshot = HealthSnapshot::unhealthy(
                checked_at,
                format!("ping timed out after {}ms", limit.as_millis()),
            );
            warn!(server = %self.name(), timeout_ms = limit.as_millis(), "ping timed out");
            self.record_health(connection_id, snapshot.clone());
            return snapshot;
        };
        let snapshot = match answered {
            Ok(()) => HealthSnapshot::healthy(checked_at, started.elapsed()),
            Err(err) => {
                if !err.is_transient() {
                    self.retire(connection_id, target_for(&err), &err.to_string())
                        .await;
                }
                HealthSnapshot::unhealthy(checked_at, err.to_string())
            }
        };
        self.record_health(connection_id, snapshot.clone());
        snapshot
    }

    /// Closes the connection and releases its transport.
    ///
    /// Returns `true` when this call performed the close and `false` when
    /// the connection was already closed.
    pub async fn close(&self) -> bool {
        let transport = {
            let mut inner = self.write();
            if inner.status == ConnectionStatus::Closed {
                return false;
            }
            inner.status = ConnectionStatus::Closed;
            inner.capabilities = None;
            inner.transport.take()
        };
        if let Some(handle) = transport {
            self.release(handle).await;
        }
        info!(server = %self.name(), "connection closed");
        true
    }

    async fn discover(&self, transport: &dyn ToolTransport) -> Result<CapabilitySet, HandshakeError> {
        let transport_error = |source: TransportError| HandshakeError::Transport {
            server: self.name().clone(),
            source,
        };
        let outcome = transport.initialize().await.map_err(transport_error)?;
        let definitions = self
            .list_all_tools(transport)
            .await
            .map_err(transport_error)?;

        let capabilities = CapabilitySet::from_discovery(
            &self.descriptor,
            outcome.protocol_version,
            outcome.server_info,
            definitions,
        )
        .map_err(|source| HandshakeError::Discovery {
            server: self.name().clone(),
            source,
        })?;
        Ok(capabilities.with_instructions(outcome.instructions))
    }

    async fn list_all_tools(
        &self,
        transport: &dyn ToolTransport,
    ) -> Result<Vec<ToolDefinition>, TransportError> {
        let mut definitions = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_TOOL_PAGES {
            let page = transport.list_tools(cursor.as_deref()).await?;
            definitions.extend(page.tools);
            let Some(next) = page.next_cursor else {
                return Ok(definitions);
            };
            cursor = Some(next);
        }
        Err(TransportError::protocol(format!(
            "{}: tool listing exceeded {MAX_TOOL_PAGES} pages",
            self.name()
        )))
    }

    fn mark_failed(&self, connection_id: ConnectionId, reason: &str) {
        let mut inner = self.write();
        if inner.connection_id != connection_id
            || !inner.status.can_transition_to(ConnectionStatus::Degraded)
        {
            return;
        }
        inner.status = ConnectionStatus::Degraded;
        inner.health = HealthSnapshot::unhealthy(self.clock.utc(), reason);
        drop(inner);
        warn!(server = %self.name(), reason, "server unavailable");
    }

    /// Moves the connection out of service after a transport failure and
    /// releases the transport. Ignored when `connection_id` is stale.
    async fn retire(&self, connection_id: ConnectionId, target: ConnectionStatus, reason: &str) {
        let transport = {
            let mut inner = self.write();
            if inner.connection_id != connection_id || !inner.status.can_transition_to(target) {
                return;
            }
            inner.status = target;
            inner.capabilities = None;
            inner.health = HealthSnapshot::unhealthy(self.clock.utc(), reason);
            inner.transport.take()
        };
        warn!(server = %self.name(), status = %target, reason, "connection lost");
        if let Some(handle) = transport {
            self.release(handle).await;
        }
    }

    fn record_health(&self, connection_id: ConnectionId, snapshot: HealthSnapshot) {
        let mut inner = self.write();
        if inner.connection_id == connection_id {
            inner.health = snapshot;
        }
    }

    async fn release(&self, transport: Arc<dyn ToolTransport>) {
        if let Err(err) = transport.close().await {
            debug!(server = %self.name(), error = %err, "transport close failed");
        }
    }

    fn handshake_timed_out(&self) -> HandshakeError {
        HandshakeError::Timeout {
            server: self.name().clone(),
            timeout: self.policy.handshake_timeout(),
        }
    }

    fn state_error(&self, status: ConnectionStatus) -> HandshakeError {
        if status == ConnectionStatus::Closed {
            return HandshakeError::Closed(self.name().clone());
        }
        HandshakeError::InvalidState {
            server: self.name().clone(),
            status,
        }
    }
}

const fn target_for(error: &TransportError) -> ConnectionStatus {
    if error.is_fatal() {
        ConnectionStatus::Closed
    } else {
        ConnectionStatus::Degraded
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("server", self.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
