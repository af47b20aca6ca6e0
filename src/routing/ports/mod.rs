//! Port contracts for tool-call routing.

mod local_tool;

pub use local_tool::{LocalTool, LocalToolError};
