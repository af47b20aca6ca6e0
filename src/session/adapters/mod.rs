//! Human interface adapters.
//!
//! - [`console`]: stdin and stdout, with Ctrl-C cancelling the session
//! - [`scripted`]: queued inputs and recorded output for tests

pub mod console;
pub mod scripted;

pub use console::{ConsoleInterface, cancel_on_ctrl_c};
pub use scripted::{Interaction, ScriptedHuman};
