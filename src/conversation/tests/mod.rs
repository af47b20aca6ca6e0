//! Unit tests for the conversation module.
//!
//! Turn validation is covered per role; the log tests cover sequencing,
//! atomic commits and the history window sent to the model.

mod turn_tests;
