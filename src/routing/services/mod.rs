//! Routing services.

mod router;

pub use router::{DEFAULT_TOOL_TIMEOUT, RouteError, ToolRouter, result_part};
