//! Port contracts for model backends.

mod backend;

#[cfg(test)]
pub use backend::MockModelBackend;
pub use backend::{ModelBackend, ModelBackendError, ModelBackendResult};
