//! Streamable-HTTP transport: JSON-RPC over POST, with JSON or SSE bodies.

use super::jsonrpc::{self, IncomingMessage, JsonRpcRequest, methods};
use crate::tool_registry::domain::{HttpTransportConfig, ServerName};
use crate::tool_registry::ports::{
    CallOutcome, InitializeOutcome, ToolPage, ToolTransport, TransportError, TransportResult,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Time allowed to establish the TCP and TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport that talks to a remote server over HTTP.
///
/// The server may assign a session identifier on `initialize`; it is echoed
/// on every later request and released with `DELETE` on close.
pub struct HttpTransport {
    server: ServerName,
    client: Client,
    url: String,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Builds a transport for `config`. No request is sent yet.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] when a configured header is
    /// not a valid HTTP header, and [`TransportError::Io`] when the HTTP
    /// client cannot be built.
    pub fn new(server: ServerName, config: &HttpTransportConfig) -> TransportResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in config.headers() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| TransportError::Unsupported(format!("header {name}: {err}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|err| TransportError::Unsupported(format!("header {name}: {err}")))?;
            headers.insert(header_name, header_value);
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(TransportError::io)?;
        Ok(Self {
            server,
            client,
            url: config.url().to_owned(),
            headers,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn post(&self, body: &JsonRpcRequest) -> reqwest::RequestBuilder {
        let mut headers = self.headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        if let Some(session) = self
            .session_id()
            .and_then(|value| HeaderValue::from_str(&value).ok())
        {
            headers.insert(SESSION_HEADER, session);
        }
        self.client.post(&self.url).headers(headers).json(body)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> TransportResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .post(&JsonRpcRequest::call(id, method, params))
            .send()
            .await
            .map_err(TransportError::io)?;

        self.check_status(response.status())?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(session.to_owned());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        let body = response.text().await.map_err(TransportError::io)?;

        let message = if is_event_stream {
            find_event_response(&body, id)?
        } else {
            match IncomingMessage::parse(&body)? {
                IncomingMessage::Response(reply) => reply,
                _ => return Err(TransportError::protocol("expected a JSON-RPC response")),
            }
        };
        message.into_result()
    }

    async fn notify(&self, method: &str) -> TransportResult<()> {
        let response = self
            .post(&JsonRpcRequest::notification(method, None))
            .send()
            .await
            .map_err(TransportError::io)?;
        self.check_status(response.status())
    }

    fn check_status(&self, status: StatusCode) -> TransportResult<()> {
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND && self.session_id().is_some() {
            return Err(TransportError::Disconnected(format!(
                "{}: session expired",
                self.server
            )));
        }
        if status.is_server_error() {
            return Err(TransportError::io(std::io::Error::other(format!(
                "{}: HTTP {status}",
                self.server
            ))));
        }
        Err(TransportError::Remote {
            code: i64::from(status.as_u16()),
            message: format!("HTTP {status}"),
        })
    }
}

/// Picks the response to `id` out of a server-sent event stream body.
fn find_event_response(body: &str, id: u64) -> TransportResult<jsonrpc::JsonRpcResponse> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.trim_start());
        } else if line.trim().is_empty() && !data.is_empty() {
            events.push(std::mem::take(&mut data));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .find_map(|event| match IncomingMessage::parse(event) {
            Ok(IncomingMessage::Response(response)) if response.numeric_id() == Some(id) => {
                Some(response)
            }
            _ => None,
        })
        .ok_or_else(|| TransportError::protocol("event stream ended without a response"))
}

#[async_trait]
impl ToolTransport for HttpTransport {
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
        self.notify(methods::INITIALIZED).await?;
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
        let Some(session) = self
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };
        let result = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await;
        if let Err(err) = result {
            debug!(server = %self.server, error = %err, "session release failed");
        }
        Ok(())
    }
}
