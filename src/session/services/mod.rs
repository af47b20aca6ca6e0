//! Session services.

mod human_tool;
mod session;

pub use human_tool::{HUMAN_INPUT_TOOL, HumanInputTool};
pub use session::{Session, SessionSummary};
