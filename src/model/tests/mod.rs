//! Unit tests for model identifiers, the backend factory and the scripted
//! backend.

mod backend_tests;
