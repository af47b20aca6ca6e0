//! Domain types for tool-call routing.

mod request;

pub use request::ToolCallRequest;
