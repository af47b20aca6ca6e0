//! Unit tests for the session module.

mod session_tests;
