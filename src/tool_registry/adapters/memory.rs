//! In-memory tool servers for tests and deterministic local runs.

use super::jsonrpc::{INVALID_PARAMS, PROTOCOL_VERSION};
use crate::tool_registry::domain::{ServerDescriptor, ServerInfo, ServerName, ToolDefinition, ToolOutput};
use crate::tool_registry::ports::{
    CallOutcome, InitializeOutcome, ToolPage, ToolTransport, TransportConnector, TransportError,
    TransportResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How an in-memory tool answers a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolBehaviour {
    /// Returns the call arguments as structured content.
    EchoArguments,
    /// Returns a fixed text result.
    Text(String),
    /// Reports a tool-level error (`isError`).
    ToolError(String),
    /// Answers with a JSON-RPC error.
    RemoteError {
        /// Error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// Fails with a transient I/O error `failures` times, then returns text.
    Flaky {
        /// Number of failing attempts before success.
        failures: u32,
        /// Text returned once the failures are used up.
        then: String,
    },
    /// Simulates the server process exiting.
    Disconnect,
    /// Simulates a malformed response.
    ProtocolViolation,
}

/// One tool offered by an [`InMemoryServer`].
#[derive(Debug, Clone)]
pub struct InMemoryTool {
    definition: ToolDefinition,
    behaviour: ToolBehaviour,
    latency: Duration,
}

impl InMemoryTool {
    /// Creates a tool with no latency.
    #[must_use]
    pub const fn new(definition: ToolDefinition, behaviour: ToolBehaviour) -> Self {
        Self {
            definition,
            behaviour,
            latency: Duration::ZERO,
        }
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Scripted server definition.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServer {
    tools: Vec<InMemoryTool>,
    handshake_failure: Option<String>,
    silent_initialize: bool,
    silent_ping: bool,
    instructions: Option<String>,
    page_size: Option<usize>,
}

impl InMemoryServer {
    /// Creates a server with no tools.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool.
    #[must_use]
    pub fn with_tool(mut self, tool: InMemoryTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Makes every `initialize` fail with `message`.
    #[must_use]
    pub fn with_handshake_failure(mut self, message: impl Into<String>) -> Self {
        self.handshake_failure = Some(message.into());
        self
    }

    /// Makes every `initialize` wait forever without answering.
    #[must_use]
    pub const fn with_silent_handshake(mut self) -> Self {
        self.silent_initialize = true;
        self
    }

    /// Makes every `ping` wait forever without answering.
    #[must_use]
    pub const fn with_silent_ping(mut self) -> Self {
        self.silent_ping = true;
        self
    }

    /// Sets the usage instructions reported on `initialize`.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Splits the tool listing into pages of `size` entries.
    #[must_use]
    pub const fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    fn tool(&self, name: &str) -> Option<&InMemoryTool> {
        self.tools.iter().find(|tool| tool.definition.name() == name)
    }
}

#[derive(Debug, Default)]
struct ServerStats {
    opened: usize,
    closed: usize,
    calls: usize,
    unreachable: bool,
    attempts: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct ConnectorState {
    servers: HashMap<ServerName, InMemoryServer>,
    stats: HashMap<ServerName, ServerStats>,
}

/// Connector that opens transports to registered [`InMemoryServer`]s.
///
/// Clones share state, so a test can keep one handle for inspection while
/// the pool owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl InMemoryConnector {
    /// Creates a connector with no servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers or replaces the server behind `name`.
    ///
    /// Replacing a server changes what open transports list on the next
    /// `tools/list`.
    pub fn register(&self, name: ServerName, server: InMemoryServer) {
        self.lock().servers.insert(name, server);
    }

    /// Makes new connections to `name` fail (or succeed again).
    pub fn set_unreachable(&self, name: &ServerName, unreachable: bool) {
        self.lock().stats.entry(name.clone()).or_default().unreachable = unreachable;
    }

    /// Returns how many transports were opened to `name`.
    #[must_use]
    pub fn open_count(&self, name: &ServerName) -> usize {
        self.lock().stats.get(name).map_or(0, |stats| stats.opened)
    }

    /// Returns how many times a transport to `name` was closed.
    #[must_use]
    pub fn close_count(&self, name: &ServerName) -> usize {
        self.lock().stats.get(name).map_or(0, |stats| stats.closed)
    }

    /// Returns how many tool calls reached `name`, retries included.
    #[must_use]
    pub fn call_count(&self, name: &ServerName) -> usize {
        self.lock().stats.get(name).map_or(0, |stats| stats.calls)
    }
}

#[async_trait]
impl TransportConnector for InMemoryConnector {
    async fn open(&self, descriptor: &ServerDescriptor) -> TransportResult<Arc<dyn ToolTransport>> {
        let name = descriptor.name();
        let mut state = self.lock();
        if !state.servers.contains_key(name) {
            return Err(TransportError::io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no in-memory server named {name}"),
            )));
        }
        let stats = state.stats.entry(name.clone()).or_default();
        if stats.unreachable {
            return Err(TransportError::io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{name} is unreachable"),
            )));
        }
        stats.opened = stats.opened.saturating_add(1);
        Ok(Arc::new(InMemoryTransport {
            name: name.clone(),
            state: Arc::clone(&self.state),
            disconnected: AtomicBool::new(false),
        }))
    }
}

/// Transport handed out by [`InMemoryConnector`].
struct InMemoryTransport {
    name: ServerName,
    state: Arc<Mutex<ConnectorState>>,
    disconnected: AtomicBool,
}

impl InMemoryTransport {
    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server(&self) -> TransportResult<InMemoryServer> {
        self.ensure_connected()?;
        self.lock()
            .servers
            .get(&self.name)
            .cloned()
            .ok_or_else(|| TransportError::Disconnected(format!("{} was removed", self.name)))
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected(format!(
                "{}: process exited",
                self.name
            )));
        }
        Ok(())
    }

    /// Counts the call and returns the attempt number for `tool`.
    fn record_attempt(&self, tool: &str) -> u32 {
        let mut state = self.lock();
        let stats = state.stats.entry(self.name.clone()).or_default();
        stats.calls = stats.calls.saturating_add(1);
        let attempts = stats.attempts.entry(tool.to_owned()).or_insert(0);
        *attempts = attempts.saturating_add(1);
        *attempts
    }
}

#[async_trait]
impl ToolTransport for InMemoryTransport {
    async fn initialize(&self) -> TransportResult<InitializeOutcome> {
        let server = self.server()?;
        if server.silent_initialize {
            std::future::pending::<()>().await;
        }
        if let Some(message) = server.handshake_failure {
            return Err(TransportError::Remote {
                code: -32603,
                message,
            });
        }
        Ok(InitializeOutcome {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            server_info: Some(ServerInfo {
                name: format!("in-memory-{}", self.name),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            }),
            instructions: server.instructions,
        })
    }

    async fn list_tools(&self, cursor: Option<&str>) -> TransportResult<ToolPage> {
        let server = self.server()?;
        let start = cursor
            .map(|value| {
                value.parse::<usize>().map_err(|_| TransportError::Remote {
                    code: INVALID_PARAMS,
                    message: format!("invalid cursor {value}"),
                })
            })
            .transpose()?
            .unwrap_or(0);
        let size = server.page_size.unwrap_or(usize::MAX);
        let tools: Vec<_> = server
            .tools
            .iter()
            .skip(start)
            .take(size)
            .map(|tool| tool.definition.clone())
            .collect();
        let end = start.saturating_add(tools.len());
        let next_cursor = (end < server.tools.len()).then(|| end.to_string());
        Ok(ToolPage { tools, next_cursor })
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> TransportResult<CallOutcome> {
        let server = self.server()?;
        let Some(tool) = server.tool(name) else {
            return Err(TransportError::Remote {
                code: INVALID_PARAMS,
                message: format!("unknown tool {name}"),
            });
        };
        let attempt = self.record_attempt(name);
        if !tool.latency.is_zero() {
            tokio::time::sleep(tool.latency).await;
        }

        match &tool.behaviour {
            ToolBehaviour::EchoArguments => Ok(CallOutcome::Success(
                ToolOutput::text(arguments.to_string()).with_structured(Some(arguments.clone())),
            )),
            ToolBehaviour::Text(text) => Ok(CallOutcome::Success(ToolOutput::text(text.clone()))),
            ToolBehaviour::ToolError(message) => Ok(CallOutcome::ToolError(message.clone())),
            ToolBehaviour::RemoteError { code, message } => Err(TransportError::Remote {
                code: *code,
                message: message.clone(),
            }),
            ToolBehaviour::Flaky { failures, then } => {
                if attempt <= *failures {
                    return Err(TransportError::io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        format!("{name} attempt {attempt} failed"),
                    )));
                }
                Ok(CallOutcome::Success(ToolOutput::text(then.clone())))
            }
            ToolBehaviour::Disconnect => {
                self.disconnected.store(true, Ordering::SeqCst);
                Err(TransportError::Disconnected(format!(
                    "{}: process exited",
                    self.name
                )))
            }
            ToolBehaviour::ProtocolViolation => {
                Err(TransportError::protocol("response was not valid JSON-RPC"))
            }
        }
    }

    async fn ping(&self) -> TransportResult<()> {
        let server = self.server()?;
        if server.silent_ping {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        let mut state = self.lock();
        let stats = state.stats.entry(self.name.clone()).or_default();
        stats.closed = stats.closed.saturating_add(1);
        Ok(())
    }
}
