//! Crate-level tests.
//!
//! - Integration tests (HTTP routes over the in-memory store, node lifecycle)

pub mod integration;
