//! Immutable settings for one session.

use crate::model::domain::ModelSpec;
use crate::routing::services::DEFAULT_TOOL_TIMEOUT;
use std::time::Duration;

/// Default cap on model/tool round trips per human message.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 20;

/// Instruction used when none is configured.
pub const DEFAULT_INSTRUCTION: &str = "You are a helpful AI Agent";

/// Agent settings fixed at session construction.
///
/// # Examples
///
/// ```
/// use switchboard::model::domain::ModelSpec;
/// use switchboard::session::domain::SessionConfig;
///
/// let config = SessionConfig::new(ModelSpec::parse("passthrough").expect("valid model"))
///     .with_human_input(false)
///     .with_message("Summarise the README");
/// assert!(!config.human_input());
/// assert_eq!(config.max_tool_rounds(), 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    name: String,
    model: ModelSpec,
    instruction: String,
    use_history: bool,
    human_input: bool,
    message: Option<String>,
    tool_timeout: Duration,
    max_tool_rounds: u32,
}

impl SessionConfig {
    /// Creates settings with defaults for everything but the model.
    #[must_use]
    pub fn new(model: ModelSpec) -> Self {
        Self {
            name: "default".to_owned(),
            model,
            instruction: DEFAULT_INSTRUCTION.to_owned(),
            use_history: true,
            human_input: true,
            message: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Sets the agent name shown in the prompt.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the instruction template.
    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Sets whether the full history is replayed to the model.
    #[must_use]
    pub const fn with_use_history(mut self, use_history: bool) -> Self {
        self.use_history = use_history;
        self
    }

    /// Sets whether the session waits for human input between replies.
    #[must_use]
    pub const fn with_human_input(mut self, human_input: bool) -> Self {
        self.human_input = human_input;
        self
    }

    /// Sets the message sent in single-shot mode.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the per-invocation tool timeout.
    #[must_use]
    pub const fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Sets the tool round cap; zero is treated as one.
    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    /// Returns the agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the model identifier.
    #[must_use]
    pub const fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Returns the instruction template.
    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Returns whether history is replayed.
    #[must_use]
    pub const fn use_history(&self) -> bool {
        self.use_history
    }

    /// Returns whether the session is interactive.
    #[must_use]
    pub const fn human_input(&self) -> bool {
        self.human_input
    }

    /// Returns the single-shot message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the per-invocation tool timeout.
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// Returns the tool round cap.
    #[must_use]
    pub const fn max_tool_rounds(&self) -> u32 {
        self.max_tool_rounds
    }
}
