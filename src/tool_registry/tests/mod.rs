//! Unit tests for server connections and the connection pool.
//!
//! Every test runs against in-memory servers so failure modes (handshake
//! errors, flaky calls, disconnects, protocol violations) are deterministic.
