//! Domain types for language-model backends.
//!
//! Model identifiers, completion requests and responses. Provider wire
//! formats stay in the adapters.

mod error;
mod request;
mod spec;

pub use error::ModelSpecError;
pub use request::{ModelRequest, ModelResponse, ToolSchema};
pub use spec::{ModelProvider, ModelSpec};
