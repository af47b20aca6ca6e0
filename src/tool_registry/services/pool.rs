//! The set of live server connections for one session.

use super::connection::{HandshakeError, RetryPolicy, ServerConnection};
use crate::SharedClock;
use crate::tool_registry::domain::{
    CapabilitySet, ConnectionStatus, HealthSnapshot, ServerDescriptor, ServerName, ToolDescriptor,
    ToolReference,
};
use crate::tool_registry::ports::TransportConnector;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while building or addressing the pool.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// Servers were configured but none completed the handshake.
    #[error("none of the configured servers could be reached: {}", summarize(.failures))]
    NoServersReachable {
        /// Each server with the reason it failed.
        failures: Vec<(ServerName, String)>,
    },

    /// Two descriptors share a server name.
    #[error("server {0} is configured more than once")]
    DuplicateServerName(ServerName),

    /// No connection exists for the server name.
    #[error("no server named {0}")]
    UnknownServer(ServerName),

    /// A reconnect or refresh failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

fn summarize(failures: &[(ServerName, String)]) -> String {
    failures
        .iter()
        .map(|(name, reason)| format!("{name} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A tool resolved to the connection that serves it.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    connection: Arc<ServerConnection>,
    tool: ToolDescriptor,
}

impl ResolvedTool {
    /// Returns the owning connection.
    #[must_use]
    pub const fn connection(&self) -> &Arc<ServerConnection> {
        &self.connection
    }

    /// Returns the tool descriptor.
    #[must_use]
    pub const fn tool(&self) -> &ToolDescriptor {
        &self.tool
    }
}

/// Outcome of resolving a tool name against the pool.
#[derive(Debug, Clone)]
pub enum ToolResolution {
    /// Exactly one `Ready` server serves the name.
    Found(ResolvedTool),
    /// Several `Ready` servers serve the bare name.
    Ambiguous(Vec<ServerName>),
    /// No `Ready` server serves the name.
    Unknown,
}

/// Point-in-time view of one connection for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHealth {
    /// Server name.
    pub name: ServerName,
    /// Connection status.
    pub status: ConnectionStatus,
    /// Latest health snapshot.
    pub health: HealthSnapshot,
    /// Number of tools currently served.
    pub tool_count: usize,
}

/// Live connections, one per configured server.
///
/// The pool is the only owner of its connections. The set of server names
/// is fixed at [`connect`](Self::connect); individual connections change
/// status over the session. Dropping a pool without calling
/// [`close`](Self::close) still releases child processes, which are killed
/// on drop.
#[derive(Debug)]
pub struct ConnectionPool {
    connections: BTreeMap<ServerName, Arc<ServerConnection>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Connects to every descriptor concurrently.
    ///
    /// Servers that fail the handshake stay in the pool as `Degraded` and
    /// can be reconnected later. An empty descriptor list yields an empty
    /// pool.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::DuplicateServerName`] when two descriptors
    /// share a name and [`ConnectionError::NoServersReachable`] when servers
    /// were configured but none connected.
    pub async fn connect(
        descriptors: Vec<ServerDescriptor>,
        connector: Arc<dyn TransportConnector>,
        clock: SharedClock,
        policy: RetryPolicy,
    ) -> Result<Self, ConnectionError> {
        let mut seen = BTreeSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.name().clone()) {
                return Err(ConnectionError::DuplicateServerName(
                    descriptor.name().clone(),
                ));
            }
        }

        let connections: BTreeMap<_, _> = descriptors
            .into_iter()
            .map(|descriptor| {
                let name = descriptor.name().clone();
                let connection = ServerConnection::new(
                    descriptor,
                    Arc::clone(&connector),
                    Arc::clone(&clock),
                    policy,
                );
                (name, Arc::new(connection))
            })
            .collect();

        let results = join_all(connections.values().map(|connection| async move {
            (connection.name().clone(), connection.handshake().await)
        }))
        .await;

        let mut failures = Vec::new();
        for (name, result) in results {
            if let Err(err) = result {
                warn!(server = %name, error = %err, "server excluded from session");
                failures.push((name, err.to_string()));
            }
        }

        let pool = Self {
            connections,
            closed: AtomicBool::new(false),
        };
        if !pool.connections.is_empty() && failures.len() == pool.connections.len() {
            pool.close().await;
            return Err(ConnectionError::NoServersReachable { failures });
        }

        info!(
            servers = pool.connections.len(),
            ready = pool.ready_count(),
            tools = pool.tools().len(),
            "connection pool ready"
        );
        Ok(pool)
    }

    /// Returns the connection for `name`.
    #[must_use]
    pub fn get(&self, name: &ServerName) -> Option<&Arc<ServerConnection>> {
        self.connections.get(name)
    }

    /// Iterates over every connection in server-name order.
    pub fn connections(&self) -> impl Iterator<Item = &Arc<ServerConnection>> {
        self.connections.values()
    }

    /// Returns the number of configured servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns whether no servers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns the number of `Ready` connections.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.connections
            .values()
            .filter(|connection| connection.status().is_routable())
            .count()
    }

    /// Returns the number of connections that are not `Closed`.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.connections
            .values()
            .filter(|connection| !connection.status().is_terminal())
            .count()
    }

    /// Returns every tool served by a `Ready` connection, ordered by
    /// qualified name.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<_> = self
            .connections
            .values()
            .flat_map(|connection| connection.tools())
            .collect();
        tools.sort_by_key(ToolDescriptor::qualified_name);
        tools
    }

    /// Resolves a tool name to the connection serving it.
    ///
    /// A qualified name (`<server>-<tool>`) wins when that server is `Ready`
    /// and serves the tool. Otherwise the name is matched as a bare tool
    /// name across all `Ready` connections.
    #[must_use]
    pub fn resolve(&self, name: &str) -> ToolResolution {
        let reference = ToolReference::parse(name);
        if let Some((server, bare)) = reference.qualified() {
            let found = self.connections.get(server).and_then(|connection| {
                connection.tool(bare).map(|tool| ResolvedTool {
                    connection: Arc::clone(connection),
                    tool,
                })
            });
            if let Some(resolved) = found {
                return ToolResolution::Found(resolved);
            }
        }

        let mut matches: Vec<_> = self
            .connections
            .values()
            .filter_map(|connection| {
                connection.tool(reference.raw()).map(|tool| ResolvedTool {
                    connection: Arc::clone(connection),
                    tool,
                })
            })
            .collect();
        match matches.len() {
            0 => ToolResolution::Unknown,
            1 => matches
                .pop()
                .map_or(ToolResolution::Unknown, ToolResolution::Found),
            _ => ToolResolution::Ambiguous(
                matches
                    .iter()
                    .map(|resolved| resolved.tool.server().clone())
                    .collect(),
            ),
        }
    }

    /// Returns the connection that uniquely serves `name`, if any.
    #[must_use]
    pub fn find_tool_owner(&self, name: &str) -> Option<Arc<ServerConnection>> {
        match self.resolve(name) {
            ToolResolution::Found(resolved) => Some(resolved.connection),
            ToolResolution::Ambiguous(_) | ToolResolution::Unknown => None,
        }
    }

    fn require(&self, name: &ServerName) -> Result<&Arc<ServerConnection>, ConnectionError> {
        self.connections
            .get(name)
            .ok_or_else(|| ConnectionError::UnknownServer(name.clone()))
    }

    /// Re-lists the tools of one server.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::UnknownServer`] for unknown names and
    /// [`ConnectionError::Handshake`] when the listing fails.
    pub async fn refresh(&self, name: &ServerName) -> Result<CapabilitySet, ConnectionError> {
        Ok(self.require(name)?.refresh().await?)
    }

    /// Re-opens one server's connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::UnknownServer`] for unknown names and
    /// [`ConnectionError::Handshake`] when the handshake fails.
    pub async fn reconnect(&self, name: &ServerName) -> Result<CapabilitySet, ConnectionError> {
        Ok(self.require(name)?.reconnect().await?)
    }

    /// Pings every connection concurrently and reports the results.
    pub async fn health_report(&self) -> Vec<ServerHealth> {
        join_all(self.connections.values().map(|connection| async move {
            let health = connection.ping().await;
            ServerHealth {
                name: connection.name().clone(),
                status: connection.status(),
                health,
                tool_count: connection.tools().len(),
            }
        }))
        .await
    }

    /// Closes every connection concurrently.
    ///
    /// Only the first call does any work; it returns the number of
    /// connections it closed. Later calls return zero.
    pub async fn close(&self) -> usize {
        if self.closed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let closed = join_all(self.connections.values().map(|connection| connection.close()))
            .await
            .into_iter()
            .filter(|performed| *performed)
            .count();
        info!(closed, "connection pool closed");
        closed
    }

    /// Returns whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) && !self.connections.is_empty() {
            warn!("connection pool dropped without close; releasing transports on drop");
        }
    }
}
