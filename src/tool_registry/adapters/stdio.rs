//! Stdio transport: a child process speaking line-delimited JSON-RPC.

use super::jsonrpc::{
    self, IncomingMessage, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, methods,
};
use crate::tool_registry::domain::{ServerName, StdioTransportConfig};
use crate::tool_registry::ports::{
    CallOutcome, InitializeOutcome, ToolPage, ToolTransport, TransportError, TransportResult,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type PendingMap = HashMap<u64, oneshot::Sender<TransportResult<Value>>>;

/// Shared state between the transport handle and its reader task.
struct Channel {
    server: ServerName,
    stdin: AsyncMutex<ChildStdin>,
    pending: Mutex<PendingMap>,
    disconnected: AtomicBool,
}

impl Channel {
    fn pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn write_message(&self, message: &impl serde::Serialize) -> TransportResult<()> {
        let mut line = serde_json::to_string(message)
            .map_err(|err| TransportError::protocol(format!("cannot encode message: {err}")))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| self.write_failure(err))?;
        stdin.flush().await.map_err(|err| self.write_failure(err))
    }

    fn write_failure(&self, err: std::io::Error) -> TransportError {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            self.disconnected.store(true, Ordering::SeqCst);
            return TransportError::Disconnected(format!("{}: stdin closed", self.server));
        }
        TransportError::io(err)
    }

    /// Fails every outstanding request once the stream ends.
    fn fail_pending(&self, reason: &str) {
        self.disconnected.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.pending().drain().collect();
        for (_, sender) in drained {
            if sender
                .send(Err(TransportError::Disconnected(reason.to_owned())))
                .is_err()
            {
                debug!(server = %self.server, "request abandoned before disconnect");
            }
        }
    }
}

/// Removes a pending entry when the awaiting request is dropped early.
struct PendingGuard<'a> {
    channel: &'a Channel,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.channel.pending().remove(&self.id);
    }
}

/// Transport backed by a spawned child process.
///
/// Standard output carries protocol messages, one JSON object per line.
/// Standard error is forwarded to the log at debug level. The child is
/// killed when the transport is closed or dropped.
pub struct StdioTransport {
    channel: Arc<Channel>,
    child: AsyncMutex<Option<Child>>,
    next_id: AtomicU64,
    tasks: Vec<JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawns the configured command and starts reading its output.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] when the process cannot be spawned and
    /// [`TransportError::Protocol`] when its pipes are unavailable.
    pub fn spawn(server: ServerName, config: &StdioTransportConfig) -> TransportResult<Self> {
        let mut command = Command::new(config.command());
        command
            .args(config.args())
            .envs(config.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = config.working_directory() {
            command.current_dir(dir.as_std_path());
        }

        let mut child = command.spawn().map_err(TransportError::io)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::protocol("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::protocol("child stdout unavailable"))?;
        let stderr = child.stderr.take();

        debug!(server = %server, command = config.command(), pid = ?child.id(), "spawned stdio server");

        let channel = Arc::new(Channel {
            server,
            stdin: AsyncMutex::new(stdin),
            pending: Mutex::new(HashMap::new()),
            disconnected: AtomicBool::new(false),
        });

        let mut tasks = vec![tokio::spawn(read_stdout(Arc::clone(&channel), stdout))];
        if let Some(stderr) = stderr {
            let server = channel.server.clone();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {line}");
                }
            }));
        }

        Ok(Self {
            channel,
            child: AsyncMutex::new(Some(child)),
            next_id: AtomicU64::new(1),
            tasks,
        })
    }

    async fn request(&self, method: &str, params: Option<Value>) -> TransportResult<Value> {
        if self.channel.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected(format!(
                "{}: process exited",
                self.channel.server
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.channel.pending().insert(id, sender);
        let _guard = PendingGuard {
            channel: &self.channel,
            id,
        };

        self.channel
            .write_message(&JsonRpcRequest::call(id, method, params))
            .await?;

        receiver.await.map_err(|_| {
            TransportError::Disconnected(format!("{}: response channel dropped", self.channel.server))
        })?
    }
}

async fn read_stdout(channel: Arc<Channel>, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => handle_line(&channel, &line).await,
            Ok(None) => {
                debug!(server = %channel.server, "stdout closed");
                channel.fail_pending(&format!("{}: process exited", channel.server));
                break;
            }
            Err(err) => {
                warn!(server = %channel.server, error = %err, "failed reading stdout");
                channel.fail_pending(&format!("{}: read failed: {err}", channel.server));
                break;
            }
        }
    }
}

async fn handle_line(channel: &Channel, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match IncomingMessage::parse(line) {
        Ok(IncomingMessage::Response(response)) => {
            let Some(id) = response.numeric_id() else {
                warn!(server = %channel.server, "response with non-numeric id ignored");
                return;
            };
            let Some(sender) = channel.pending().remove(&id) else {
                debug!(server = %channel.server, id, "response for abandoned request");
                return;
            };
            if sender.send(response.into_result()).is_err() {
                debug!(server = %channel.server, id, "requester went away");
            }
        }
        Ok(IncomingMessage::Request(request)) => {
            let id = request.id.unwrap_or(Value::Null);
            let reply = if request.method == methods::PING {
                JsonRpcResponse::success(id, json!({}))
            } else {
                JsonRpcResponse::failure(id, METHOD_NOT_FOUND, "client does not serve requests")
            };
            if let Err(err) = channel.write_message(&reply).await {
                warn!(server = %channel.server, error = %err, "failed replying to server request");
            }
        }
        Ok(IncomingMessage::Notification(notification)) => {
            debug!(server = %channel.server, method = %notification.method, "notification");
        }
        Err(err) => {
            warn!(server = %channel.server, error = %err, "skipping non-protocol output");
        }
    }
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn initialize(&self) -> TransportResult<InitializeOutcome> {
        let result = self
            .request(
                methods::INITIALIZE,
                Some(jsonrpc::initialize_params(
                    env!("CARGO_PKG_NAME"),
                    env!("CARGO_PKG_VERSION"),
                )),
            )
            .await?;
        let outcome = jsonrpc::parse_initialize_result(result)?;
        self.channel
            .write_message(&JsonRpcRequest::notification(methods::INITIALIZED, None))
            .await?;
        Ok(outcome)
    }

    async fn list_tools(&self, cursor: Option<&str>) -> TransportResult<ToolPage> {
        let result = self
            .request(methods::TOOLS_LIST, jsonrpc::list_tools_params(cursor))
            .await?;
        jsonrpc::parse_tool_page(result)
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> TransportResult<CallOutcome> {
        let result = self
            .request(methods::TOOLS_CALL, Some(jsonrpc::call_tool_params(name, arguments)))
            .await?;
        jsonrpc::parse_call_result(result)
    }

    async fn ping(&self) -> TransportResult<()> {
        self.request(methods::PING, None).await.map(|_| ())
    }

    async fn close(&self) -> TransportResult<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        self.channel.fail_pending(&format!("{}: closed", self.channel.server));
        for task in &self.tasks {
            task.abort();
        }
        if let Err(err) = child.kill().await {
            // The process may already have exited.
            debug!(server = %self.channel.server, error = %err, "kill failed");
        }
        debug!(server = %self.channel.server, "stdio server stopped");
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
