//! Domain types for the session loop.
//!
//! Settings, loop states, interactive commands, display events and
//! instruction rendering. No I/O happens here.

mod command;
mod config;
mod error;
mod event;
mod instruction;
mod state;

pub use command::{CommandError, STOP_WORD, SessionCommand};
pub use config::{DEFAULT_INSTRUCTION, DEFAULT_MAX_TOOL_ROUNDS, SessionConfig};
pub use error::SessionFatalError;
pub use event::{HumanInput, SessionEvent};
pub use instruction::{InstructionError, render_instruction};
pub use state::{SessionState, TerminationReason};
