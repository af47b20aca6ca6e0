//! Services that own server connections and the pool built from them.

mod connection;
mod pool;

pub use connection::{HandshakeError, InvokeError, RetryPolicy, ServerConnection};
pub use pool::{ConnectionError, ConnectionPool, ResolvedTool, ServerHealth, ToolResolution};
