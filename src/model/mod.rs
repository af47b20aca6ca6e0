//! Language-model backends.
//!
//! A session sends the conversation and the tool catalogue to a
//! [`ports::ModelBackend`] and gets back either text or tool calls. Model
//! identifiers take the form `<provider>.<model>`.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
