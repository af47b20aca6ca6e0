//! Liveness reporting for server connections.

use super::ParseHealthStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Liveness of a server as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No probe has completed yet.
    Unknown,
    /// The server answered the last probe.
    Healthy,
    /// The last probe failed.
    Unhealthy,
}

impl HealthStatus {
    /// Returns the canonical text representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for HealthStatus {
    type Error = ParseHealthStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "healthy" => Ok(Self::Healthy),
            "unhealthy" => Ok(Self::Unhealthy),
            _ => Err(ParseHealthStatusError(value.to_owned())),
        }
    }
}

/// Timestamped result of a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    status: HealthStatus,
    checked_at: DateTime<Utc>,
    round_trip: Option<Duration>,
    message: Option<String>,
}

impl HealthSnapshot {
    /// Creates a snapshot with no probe result.
    #[must_use]
    pub const fn unknown(checked_at: DateTime<Utc>) -> Self {
        Self {
            status: HealthStatus::Unknown,
            checked_at,
            round_trip: None,
            message: None,
        }
    }

    /// Creates a `healthy` snapshot with the measured round trip.
    #[must_use]
    pub const fn healthy(checked_at: DateTime<Utc>, round_trip: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            checked_at,
            round_trip: Some(round_trip),
            message: None,
        }
    }

    /// Creates an `unhealthy` snapshot with details.
    #[must_use]
    pub fn unhealthy(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        let normalized = message.into().trim().to_owned();
        Self {
            status: HealthStatus::Unhealthy,
            checked_at,
            round_trip: None,
            message: (!normalized.is_empty()).then_some(normalized),
        }
    }

    /// Returns the health status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Returns when the probe ran.
    #[must_use]
    pub const fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Returns the probe round trip for healthy snapshots.
    #[must_use]
    pub const fn round_trip(&self) -> Option<Duration> {
        self.round_trip
    }

    /// Returns an optional diagnostic message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
