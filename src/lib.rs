//! Switchboard: multi-server agent orchestration runtime.
//!
//! This crate connects to a set of MCP tool-provider servers, offers their
//! tools to a language model, routes the tool calls the model issues to the
//! server that owns each tool, and drives an interactive session between a
//! human, the model and the servers.
//!
//! # Architecture
//!
//! Switchboard follows hexagonal architecture principles:
//!
//! - **Domain**: Pure value types and validation with no infrastructure
//!   dependencies
//! - **Ports**: Abstract trait interfaces for transports, model backends and
//!   the human
//! - **Adapters**: Concrete implementations of ports (stdio, HTTP, OpenAI,
//!   console, in-memory and scripted doubles)
//!
//! # Modules
//!
//! - [`tool_registry`]: Server connections and the connection pool
//! - [`routing`]: Tool-call resolution and concurrent dispatch
//! - [`conversation`]: The ordered conversation log
//! - [`model`]: Model identifiers and backends
//! - [`session`]: The human/model/tool loop
//! - [`config`]: The YAML settings file

use std::sync::Arc;

pub mod config;
pub mod conversation;
pub mod model;
pub mod routing;
pub mod session;
pub mod tool_registry;

/// Clock shared by every component that stamps times.
pub type SharedClock = Arc<dyn mockable::Clock + Send + Sync>;
