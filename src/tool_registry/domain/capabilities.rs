//! Capability sets produced by the discovery handshake.

use super::{ServerDescriptor, ToolDefinition, ToolDescriptor, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identity a server reports during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
}

/// What the handshake learned about a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    protocol_version: String,
    server_info: Option<ServerInfo>,
    instructions: Option<String>,
    tools: Vec<ToolDescriptor>,
}

impl CapabilitySet {
    /// Validates discovered tools against the descriptor and binds them to
    /// the server.
    ///
    /// Tools missing from the descriptor's declared allow-list are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::DuplicateTool`] when the server
    /// advertises the same tool name twice.
    pub fn from_discovery(
        descriptor: &ServerDescriptor,
        protocol_version: impl Into<String>,
        server_info: Option<ServerInfo>,
        definitions: Vec<ToolDefinition>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if !seen.insert(definition.name().to_owned()) {
                return Err(ToolRegistryDomainError::DuplicateTool {
                    server: descriptor.name().clone(),
                    tool: definition.name().to_owned(),
                });
            }
            if descriptor.declares(definition.name()) {
                tools.push(ToolDescriptor::new(descriptor.name().clone(), definition));
            }
        }

        Ok(Self {
            protocol_version: protocol_version.into(),
            server_info,
            instructions: None,
            tools,
        })
    }

    /// Attaches usage instructions the server supplied.
    #[must_use]
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions.filter(|text| !text.trim().is_empty());
        self
    }

    /// Returns the negotiated protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Returns the reported server identity.
    #[must_use]
    pub const fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Returns server-supplied usage instructions.
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Returns the accepted tools.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Finds a tool by bare name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name() == name)
    }
}
