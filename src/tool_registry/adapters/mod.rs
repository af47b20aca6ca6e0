//! Transport adapters for tool-provider servers.

pub mod http;
pub mod jsonrpc;
pub mod memory;
pub mod stdio;

use crate::tool_registry::domain::{ServerDescriptor, ServerTransport};
use crate::tool_registry::ports::{ToolTransport, TransportConnector, TransportResult};
use async_trait::async_trait;
use std::sync::Arc;

pub use http::HttpTransport;
pub use memory::{InMemoryConnector, InMemoryServer, InMemoryTool, ToolBehaviour};
pub use stdio::StdioTransport;

/// Connector that picks the adapter from the descriptor's transport kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl TransportConnector for DefaultConnector {
    async fn open(&self, descriptor: &ServerDescriptor) -> TransportResult<Arc<dyn ToolTransport>> {
        let name = descriptor.name().clone();
        match descriptor.transport() {
            ServerTransport::Stdio(config) => Ok(Arc::new(StdioTransport::spawn(name, config)?)),
            ServerTransport::Http(config) => Ok(Arc::new(HttpTransport::new(name, config)?)),
        }
    }
}
