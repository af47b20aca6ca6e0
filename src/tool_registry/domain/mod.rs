//! Domain model for tool-provider servers and their tools.
//!
//! The domain models server identity, transport parameters, the connection
//! state machine, health snapshots, and discovered tool metadata.
//! Infrastructure concerns remain outside this boundary.

mod capabilities;
mod descriptor;
mod error;
mod health;
mod ids;
mod output;
mod status;
mod tool;
mod transport;

pub use capabilities::{CapabilitySet, ServerInfo};
pub use descriptor::ServerDescriptor;
pub use error::{ParseConnectionStatusError, ParseHealthStatusError, ToolRegistryDomainError};
pub use health::{HealthSnapshot, HealthStatus};
pub use ids::{ConnectionId, ServerName};
pub use output::ToolOutput;
pub use status::ConnectionStatus;
pub use tool::{QUALIFIED_NAME_SEPARATOR, ToolDefinition, ToolDescriptor, ToolReference};
pub use transport::{HttpTransportConfig, ServerTransport, StdioTransportConfig};
