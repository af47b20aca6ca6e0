//! Settings for the `switchboard` binary.
//!
//! Settings come from a YAML file. Its path is the first command-line
//! argument, else `SWITCHBOARD_CONFIG`, else `switchboard.yaml` in the
//! working directory. `SWITCHBOARD_MODEL`, `OPENAI_API_KEY` and
//! `OPENAI_BASE_URL` override the file.
//!
//! ```yaml
//! default_model: openai.gpt-4.1
//! logger:
//!   level: info
//! mcp:
//!   handshake_timeout_secs: 30
//!   servers:
//!     filesystem:
//!       command: npx
//!       args: ["-y", "@modelcontextprotocol/server-filesystem", "."]
//!     search:
//!       transport: http
//!       url: https://example.com/mcp
//! agent:
//!   name: researcher
//!   servers: [filesystem, search]
//!   human_input: true
//! ```

mod error;
mod settings;

pub use error::ConfigError;
pub use settings::{
    AgentSettings, CONFIG_PATH_ENV, DEFAULT_SETTINGS_FILE, EndpointSettings, FALLBACK_MODEL,
    LoggerSettings, MODEL_ENV, McpSettings, OPENAI_API_KEY_ENV, OPENAI_BASE_URL_ENV,
    ServerSettings, Settings, TransportKind, resolve_settings_path,
};

#[cfg(test)]
mod tests;
