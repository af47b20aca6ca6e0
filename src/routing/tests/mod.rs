//! Unit tests for the tool router.

mod router_tests;
