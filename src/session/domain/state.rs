//! Session loop states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the session loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Built but not yet running.
    Idle,
    /// Waiting for the human.
    AwaitingHumanInput,
    /// Waiting for the model.
    ModelInvocation,
    /// Running the tool calls of one model turn.
    ToolDispatch,
    /// Finished. Terminal.
    Terminated,
}

impl SessionState {
    /// Returns the canonical text representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingHumanInput => "awaiting_human_input",
            Self::ModelInvocation => "model_invocation",
            Self::ToolDispatch => "tool_dispatch",
            Self::Terminated => "terminated",
        }
    }

    /// Returns whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns whether the loop may move from this state to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Idle => matches!(
                target,
                Self::AwaitingHumanInput | Self::ModelInvocation | Self::Terminated
            ),
            Self::AwaitingHumanInput => matches!(
                target,
                Self::AwaitingHumanInput | Self::ModelInvocation | Self::Terminated
            ),
            Self::ModelInvocation => matches!(
                target,
                Self::AwaitingHumanInput | Self::ToolDispatch | Self::Terminated
            ),
            Self::ToolDispatch => matches!(
                target,
                Self::ModelInvocation | Self::AwaitingHumanInput | Self::Terminated
            ),
            Self::Terminated => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Why a session ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The human sent the end-session signal.
    EndSignal,
    /// The session's cancellation token fired.
    Cancelled,
    /// A single-shot session delivered its reply.
    Completed,
}

impl TerminationReason {
    /// Returns the canonical text representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EndSignal => "end_signal",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
