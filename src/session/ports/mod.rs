//! Port contracts for the session loop.

mod human;

pub use human::{HumanInterface, HumanInterfaceError};
