//! Immutable description of a configured tool-provider server.

use super::{ServerName, ServerTransport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A server as configured: name, how to reach it, and which tools the agent
/// is allowed to see from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    name: ServerName,
    transport: ServerTransport,
    declared_tools: Option<BTreeSet<String>>,
}

impl ServerDescriptor {
    /// Creates a descriptor that accepts every tool the server advertises.
    #[must_use]
    pub const fn new(name: ServerName, transport: ServerTransport) -> Self {
        Self {
            name,
            transport,
            declared_tools: None,
        }
    }

    /// Restricts discovery to the given tool names.
    #[must_use]
    pub fn with_declared_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.declared_tools = Some(
            tools
                .into_iter()
                .map(|tool| tool.trim().to_owned())
                .filter(|tool| !tool.is_empty())
                .collect(),
        );
        self
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the transport parameters.
    #[must_use]
    pub const fn transport(&self) -> &ServerTransport {
        &self.transport
    }

    /// Returns the declared tool allow-list, if any.
    #[must_use]
    pub const fn declared_tools(&self) -> Option<&BTreeSet<String>> {
        self.declared_tools.as_ref()
    }

    /// Returns whether a discovered tool passes the declared allow-list.
    #[must_use]
    pub fn declares(&self, tool_name: &str) -> bool {
        self.declared_tools
            .as_ref()
            .is_none_or(|declared| declared.contains(tool_name))
    }
}
