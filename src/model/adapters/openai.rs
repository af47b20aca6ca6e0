//! OpenAI-compatible chat-completions backend.
//!
//! Serves both the `openai` provider and `generic` endpoints that speak the
//! same wire format (local runtimes such as Ollama).

use crate::conversation::domain::{ContentPart, Role, ToolCallPart, Turn};
use crate::model::domain::{ModelRequest, ModelResponse, ToolSchema};
use crate::model::ports::{ModelBackend, ModelBackendError, ModelBackendResult};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default `OpenAI` endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default endpoint for `generic` models.
pub const GENERIC_BASE_URL: &str = "http://localhost:11434/v1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    /// Bearer token; optional for local endpoints.
    pub api_key: Option<String>,
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Total time allowed for one completion.
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    /// Settings for the public `OpenAI` API.
    #[must_use]
    pub fn openai(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: OPENAI_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Settings for a local OpenAI-compatible runtime.
    #[must_use]
    pub fn generic() -> Self {
        Self {
            api_key: None,
            base_url: GENERIC_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(300),
        }
    }

    /// Overrides the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Backend that calls `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: HttpClient,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ModelBackendError::Transport`] when the client cannot be
    /// built.
    pub fn new(config: OpenAiConfig) -> ModelBackendResult<Self> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(ModelBackendError::transport)?;
        Ok(Self { http, config })
    }

    /// Returns the endpoint settings.
    #[must_use]
    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn map_send_error(&self, err: reqwest::Error) -> ModelBackendError {
        if err.is_timeout() {
            ModelBackendError::Timeout(self.config.request_timeout)
        } else {
            ModelBackendError::transport(err)
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn complete(&self, request: &ModelRequest) -> ModelBackendResult<ModelResponse> {
        let body = build_chat_request(request);
        debug!(
            model = %request.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "sending chat completion"
        );
        let mut builder = self.http.post(self.config.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| self.map_send_error(err))?;
        if !status.is_success() {
            let message = error_message(&text);
            warn!(status = status.as_u16(), %message, "chat completion failed");
            return Err(ModelBackendError::Backend {
                status: status.as_u16(),
                message,
            });
        }
        parse_chat_response(&text)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    model: String,
    pub(crate) messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tools: Option<Vec<ChatTool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: &'static str,
    pub(crate) content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) tool_calls: Vec<WireToolCall>,
}

impl ChatMessage {
    fn plain(role: &'static str, content: String) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_owned()
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSchema> for ChatTool {
    fn from(schema: &ToolSchema) -> Self {
        Self {
            kind: "function",
            function: ChatFunction {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.input_schema.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

/// Converts a request into the chat-completions wire format.
pub(crate) fn build_chat_request(request: &ModelRequest) -> ChatRequest {
    let system = Some(request.instruction.trim())
        .filter(|instruction| !instruction.is_empty())
        .map(|instruction| ChatMessage::plain("system", instruction.to_owned()));
    let messages = system
        .into_iter()
        .chain(request.turns.iter().flat_map(turn_messages))
        .collect();
    let tools = Some(request.tools.iter().map(ChatTool::from).collect::<Vec<_>>())
        .filter(|tools| !tools.is_empty());
    ChatRequest {
        model: request.model.model().to_owned(),
        messages,
        tools,
    }
}

fn turn_messages(turn: &Turn) -> Vec<ChatMessage> {
    match turn.role() {
        Role::Human => vec![ChatMessage::plain("user", turn.text())],
        Role::Assistant => {
            let tool_calls = turn
                .tool_calls()
                .map(|call| WireToolCall {
                    id: Some(call.call_id.clone()),
                    kind: function_type(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect();
            vec![ChatMessage {
                role: "assistant",
                content: turn.text(),
                tool_call_id: None,
                tool_calls,
            }]
        }
        Role::ToolResult => turn
            .content()
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult(result) => Some(ChatMessage {
                    role: "tool",
                    content: result.content_text(),
                    tool_call_id: Some(result.call_id.clone()),
                    tool_calls: Vec::new(),
                }),
                ContentPart::Text(_) | ContentPart::ToolCall(_) => None,
            })
            .collect(),
    }
}

/// Interprets a successful chat-completions body.
pub(crate) fn parse_chat_response(body: &str) -> ModelBackendResult<ModelResponse> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|err| ModelBackendError::Malformed(format!("invalid response body: {err}")))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelBackendError::Malformed("response has no choices".to_owned()))?;
    let text = choice.message.content.filter(|value| !value.trim().is_empty());
    if choice.message.tool_calls.is_empty() {
        return text
            .map(ModelResponse::Text)
            .ok_or_else(|| ModelBackendError::Malformed("response has no content".to_owned()));
    }
    let calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(into_tool_call)
        .collect::<ModelBackendResult<Vec<_>>>()?;
    Ok(ModelResponse::ToolCalls { text, calls })
}

fn into_tool_call(call: WireToolCall) -> ModelBackendResult<ToolCallPart> {
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(raw).map_err(|err| {
            ModelBackendError::Malformed(format!(
                "arguments for {} are not JSON: {err}",
                call.function.name
            ))
        })?
    };
    let call_id = call
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
    Ok(ToolCallPart::new(call_id, call.function.name, arguments))
}

/// Extracts `error.message` from an error body, falling back to the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_owned())
}
