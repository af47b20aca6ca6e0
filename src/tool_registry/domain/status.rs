//! Connection state machine.

use super::ParseConnectionStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one server connection.
///
/// ```text
/// Connecting --handshake ok--> Ready --transport error--> Degraded
///      |                         ^                           |
///      +--handshake failed-------|-------------> Degraded    |
///                                +------reconnect ok---------+
/// any --close / fatal failure--> Closed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Transport is being opened or the handshake is in progress.
    Connecting,
    /// Handshake completed; the connection accepts invocations.
    Ready,
    /// The transport failed; invocations fail fast until a reconnect.
    Degraded,
    /// The connection was torn down and will not be reused.
    Closed,
}

impl ConnectionStatus {
    /// Returns the canonical text representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }

    /// Returns whether the router may send invocations to this connection.
    #[must_use]
    pub const fn is_routable(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns whether the connection can never be used again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Connecting, Self::Ready | Self::Degraded | Self::Closed)
                | (Self::Ready, Self::Connecting | Self::Degraded | Self::Closed)
                | (
                    Self::Degraded,
                    Self::Connecting | Self::Ready | Self::Closed
                )
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConnectionStatus {
    type Error = ParseConnectionStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "connecting" => Ok(Self::Connecting),
            "ready" => Ok(Self::Ready),
            "degraded" => Ok(Self::Degraded),
            "closed" => Ok(Self::Closed),
            _ => Err(ParseConnectionStatusError(value.to_owned())),
        }
    }
}
