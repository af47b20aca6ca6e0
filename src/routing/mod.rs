//! Tool-call routing.
//!
//! The [`services::ToolRouter`] takes the tool calls of one model turn,
//! finds the server (or local tool) that owns each name, runs them
//! concurrently and hands back one result per call in request order.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Orchestration services in [`services`]

pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
