//! Tool metadata discovered from tool-provider servers.

use super::{ServerName, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Separator between the server namespace and the tool name in a qualified
/// tool name. Server names never contain it.
pub const QUALIFIED_NAME_SEPARATOR: char = '-';

/// Tool metadata as advertised by a server, before it is bound to an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    name: String,
    description: Option<String>,
    input_schema: Value,
    output_schema: Option<Value>,
}

impl ToolDefinition {
    /// Creates a tool definition.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyToolName`] when the name is
    /// blank, or [`ToolRegistryDomainError::InvalidInputSchema`] when the
    /// input schema is not a JSON object.
    pub fn new(name: impl Into<String>, input_schema: Value) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyToolName);
        }

        if !input_schema.is_object() {
            return Err(ToolRegistryDomainError::InvalidInputSchema(normalized_name));
        }

        Ok(Self {
            name: normalized_name,
            description: None,
            input_schema,
            output_schema: None,
        })
    }

    /// Sets a human-readable description. Blank descriptions are ignored.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let normalized = description.into().trim().to_owned();
        if !normalized.is_empty() {
            self.description = Some(normalized);
        }
        self
    }

    /// Sets an optional output schema.
    #[must_use]
    pub fn with_output_schema(mut self, output_schema: Value) -> Self {
        self.output_schema = Some(output_schema);
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns the optional output schema.
    #[must_use]
    pub const fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }
}

/// A tool bound to the server that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    server: ServerName,
    definition: ToolDefinition,
}

impl ToolDescriptor {
    /// Binds a definition to its owning server.
    #[must_use]
    pub const fn new(server: ServerName, definition: ToolDefinition) -> Self {
        Self { server, definition }
    }

    /// Returns the owning server name.
    #[must_use]
    pub const fn server(&self) -> &ServerName {
        &self.server
    }

    /// Returns the bare tool name, unique within its server.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Returns the `<server>-<tool>` name advertised to the model.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!(
            "{}{QUALIFIED_NAME_SEPARATOR}{}",
            self.server,
            self.definition.name()
        )
    }

    /// Returns the underlying definition.
    #[must_use]
    pub const fn definition(&self) -> &ToolDefinition {
        &self.definition
    }
}

/// A tool name as written by the model: bare or server-qualified.
///
/// Bare tool names may themselves contain the separator (for example
/// `resolve-library-id`), so parsing keeps both readings and leaves the final
/// decision to the lookup against discovered tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReference {
    raw: String,
    qualified: Option<(ServerName, String)>,
}

impl ToolReference {
    /// Parses a tool reference.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let qualified = trimmed
            .split_once(QUALIFIED_NAME_SEPARATOR)
            .and_then(|(server, tool)| {
                if tool.is_empty() {
                    return None;
                }
                ServerName::new(server)
                    .ok()
                    .map(|server_name| (server_name, tool.to_owned()))
            });

        Self {
            raw: trimmed.to_owned(),
            qualified,
        }
    }

    /// Returns the reference exactly as written (trimmed).
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the `(server, tool)` reading when the reference is
    /// syntactically qualified.
    #[must_use]
    pub fn qualified(&self) -> Option<(&ServerName, &str)> {
        self.qualified
            .as_ref()
            .map(|(server, tool)| (server, tool.as_str()))
    }
}

impl fmt::Display for ToolReference {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}
