//! The YAML settings file and what the runtime builds from it.

use super::ConfigError;
use crate::model::adapters::{OpenAiConfig, ProviderSettings};
use crate::model::domain::ModelSpec;
use crate::session::domain::{DEFAULT_INSTRUCTION, DEFAULT_MAX_TOOL_ROUNDS, SessionConfig};
use crate::tool_registry::domain::{
    HttpTransportConfig, ServerDescriptor, ServerName, ServerTransport, StdioTransportConfig,
};
use crate::tool_registry::services::RetryPolicy;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// File read when neither the command line nor the environment names one.
pub const DEFAULT_SETTINGS_FILE: &str = "switchboard.yaml";

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "SWITCHBOARD_CONFIG";

/// Environment variable overriding the agent's model.
pub const MODEL_ENV: &str = "SWITCHBOARD_MODEL";

/// Environment variable carrying the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the OpenAI base URL.
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Model used when the settings name none.
pub const FALLBACK_MODEL: &str = "passthrough";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Picks the settings file: the command-line argument, then
/// `SWITCHBOARD_CONFIG`, then `switchboard.yaml`.
///
/// # Examples
///
/// ```
/// use switchboard::config::resolve_settings_path;
///
/// let path = resolve_settings_path(None, |_| None);
/// assert_eq!(path.as_str(), "switchboard.yaml");
///
/// let path = resolve_settings_path(Some("agents/dev.yaml"), |_| Some("ignored.yaml".to_owned()));
/// assert_eq!(path.as_str(), "agents/dev.yaml");
/// ```
pub fn resolve_settings_path(
    argument: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Utf8PathBuf {
    argument
        .map(str::to_owned)
        .or_else(|| lookup(CONFIG_PATH_ENV).filter(|value| !value.trim().is_empty()))
        .map_or_else(|| Utf8PathBuf::from(DEFAULT_SETTINGS_FILE), Utf8PathBuf::from)
}

/// Root of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Model used when the agent does not name one.
    pub default_model: Option<String>,
    /// Logging settings.
    pub logger: LoggerSettings,
    /// OpenAI endpoint settings.
    pub openai: EndpointSettings,
    /// Settings for OpenAI-compatible local endpoints.
    pub generic: EndpointSettings,
    /// Tool-provider servers.
    pub mcp: McpSettings,
    /// The agent to run.
    pub agent: AgentSettings,
}

/// `logger` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerSettings {
    /// Default tracing level for this crate.
    pub level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// `openai` and `generic` sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointSettings {
    /// API key sent as a bearer token.
    pub api_key: Option<String>,
    /// Base URL of the chat-completions API.
    pub base_url: Option<String>,
}

/// `mcp` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpSettings {
    /// Servers keyed by name.
    pub servers: BTreeMap<String, ServerSettings>,
    /// Seconds allowed for a server handshake, tool refresh or ping.
    pub handshake_timeout_secs: u64,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            servers: BTreeMap::new(),
            handshake_timeout_secs: RetryPolicy::DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
        }
    }
}

/// How a configured server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking over stdin and stdout.
    Stdio,
    /// HTTP endpoint.
    Http,
}

/// One entry under `mcp.servers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Transport; inferred from `url` when omitted.
    pub transport: Option<TransportKind>,
    /// Command to launch (stdio).
    pub command: Option<String>,
    /// Command arguments (stdio).
    pub args: Vec<String>,
    /// Extra environment variables (stdio).
    pub env: BTreeMap<String, String>,
    /// Working directory (stdio).
    pub cwd: Option<Utf8PathBuf>,
    /// Endpoint URL (http).
    pub url: Option<String>,
    /// Extra request headers (http).
    pub headers: BTreeMap<String, String>,
    /// Tools the server is expected to serve.
    pub tools: Option<Vec<String>>,
}

impl ServerSettings {
    /// Returns the transport, inferring HTTP when only a URL is given.
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        match (self.transport, &self.url, &self.command) {
            (Some(kind), _, _) => kind,
            (None, Some(_), None) => TransportKind::Http,
            _ => TransportKind::Stdio,
        }
    }

    /// Builds the descriptor for the server called `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the name, command, URL or working
    /// directory is invalid.
    pub fn to_descriptor(&self, name: &str) -> Result<ServerDescriptor, ConfigError> {
        let invalid = |source| ConfigError::Server {
            name: name.to_owned(),
            source,
        };
        let server_name = ServerName::new(name).map_err(invalid)?;
        let transport = match self.transport_kind() {
            TransportKind::Stdio => {
                let command = self
                    .command
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingCommand(name.to_owned()))?;
                let config = StdioTransportConfig::new(command)
                    .map_err(invalid)?
                    .with_args(self.args.iter().cloned())
                    .with_env(self.env.clone());
                let config = match &self.cwd {
                    Some(cwd) => config.with_working_directory(cwd).map_err(invalid)?,
                    None => config,
                };
                ServerTransport::Stdio(config)
            }
            TransportKind::Http => {
                let url = self
                    .url
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingUrl(name.to_owned()))?;
                ServerTransport::Http(
                    HttpTransportConfig::new(url)
                        .map_err(invalid)?
                        .with_headers(self.headers.clone()),
                )
            }
        };
        let mut descriptor = ServerDescriptor::new(server_name, transport);
        if let Some(tools) = &self.tools {
            descriptor = descriptor.with_declared_tools(tools.iter().cloned());
        }
        Ok(descriptor)
    }
}

/// `agent` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    /// Name shown in the prompt.
    pub name: String,
    /// Instruction template.
    pub instruction: String,
    /// Model identifier; falls back to `default_model`.
    pub model: Option<String>,
    /// Servers to connect, in order; every configured server when omitted.
    pub servers: Option<Vec<String>>,
    /// Whether the model sees the whole conversation.
    pub use_history: bool,
    /// Whether the session reads input from the human.
    pub human_input: bool,
    /// Message for single-shot runs.
    pub message: Option<String>,
    /// Per-call tool timeout in seconds.
    pub tool_timeout_secs: u64,
    /// Cap on tool rounds per human message.
    pub max_tool_rounds: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            instruction: DEFAULT_INSTRUCTION.to_owned(),
            model: None,
            servers: None,
            use_history: true,
            human_input: true,
            message: None,
            tool_timeout_secs: 60,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

impl Settings {
    /// Parses settings from YAML text. An empty document yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the YAML does not match the
    /// schema.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reads and parses the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, or
    /// [`ConfigError::Parse`] when it is malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        debug!(%path, "settings file read");
        Self::from_yaml(&text)
    }

    /// Applies `SWITCHBOARD_MODEL`, `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    ///
    /// Blank values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(model) = read(MODEL_ENV) {
            self.agent.model = Some(model);
        }
        if let Some(api_key) = read(OPENAI_API_KEY_ENV) {
            self.openai.api_key = Some(api_key);
        }
        if let Some(base_url) = read(OPENAI_BASE_URL_ENV) {
            self.openai.base_url = Some(base_url);
        }
        self
    }

    /// Returns the agent's model: its own, else `default_model`, else
    /// `passthrough`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Model`] when the identifier is invalid.
    pub fn model_spec(&self) -> Result<ModelSpec, ConfigError> {
        let raw = self
            .agent
            .model
            .as_deref()
            .or_else(|| self.default_model.as_deref())
            .unwrap_or(FALLBACK_MODEL);
        Ok(ModelSpec::parse(raw)?)
    }

    /// Returns the descriptors of the servers the agent uses.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownServer`] when the agent names a server
    /// that is not configured, or the error for an invalid entry.
    pub fn server_descriptors(&self) -> Result<Vec<ServerDescriptor>, ConfigError> {
        let Some(selected) = &self.agent.servers else {
            return self
                .mcp
                .servers
                .iter()
                .map(|(name, server)| server.to_descriptor(name))
                .collect();
        };
        selected
            .iter()
            .map(|name| {
                self.mcp
                    .servers
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownServer(name.clone()))
                    .and_then(|server| server.to_descriptor(name))
            })
            .collect()
    }

    /// Builds the session settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Model`] when the model identifier is invalid.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let agent = &self.agent;
        let mut config = SessionConfig::new(self.model_spec()?)
            .with_name(agent.name.clone())
            .with_instruction(agent.instruction.clone())
            .with_use_history(agent.use_history)
            .with_human_input(agent.human_input)
            .with_tool_timeout(Duration::from_secs(agent.tool_timeout_secs))
            .with_max_tool_rounds(agent.max_tool_rounds);
        if let Some(message) = &agent.message {
            config = config.with_message(message.clone());
        }
        Ok(config)
    }

    /// Builds the connection policy for configured servers.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_handshake_timeout(Duration::from_secs(self.mcp.handshake_timeout_secs))
    }

    /// Builds the endpoint settings for HTTP model providers.
    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        let mut openai = OpenAiConfig::openai(self.openai.api_key.clone());
        if let Some(url) = &self.openai.base_url {
            openai = openai.with_base_url(url.clone());
        }
        let mut generic = OpenAiConfig::generic();
        generic.api_key.clone_from(&self.generic.api_key);
        if let Some(url) = &self.generic.base_url {
            generic = generic.with_base_url(url.clone());
        }
        ProviderSettings { openai, generic }
    }

    /// Returns the default tracing filter, such as `switchboard=info`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLogLevel`] for an unknown level.
    pub fn log_filter(&self) -> Result<String, ConfigError> {
        let level = self.logger.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logger.level.clone()));
        }
        Ok(format!("switchboard={level}"))
    }
}
