//! Connections to tool-provider servers.
//!
//! Each configured server gets one [`services::ServerConnection`] that
//! spawns or dials the server, performs the protocol handshake, discovers
//! its tools and invokes them. The [`services::ConnectionPool`] owns every
//! connection for a session and resolves tool names to the server that
//! serves them. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
