//! The agent session loop.
//!
//! A [`services::Session`] reads human input, sends the conversation and the
//! available tools to the model, routes the tool calls the model issues and
//! feeds their results back until the model answers in plain text. Lines
//! starting with `/` are interactive commands. The session owns the
//! connection pool's lifetime and closes it exactly once on the way out.
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
