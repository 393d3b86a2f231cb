//! keyscan: cursor-driven glob scanning of a key-value store.
//!
//! The scan engine walks the keyspace one bounded page at a time, resuming from an opaque
//! cursor, and fans every matched key out to the callbacks requested for the scan. Callback
//! failures are isolated from the scan; store failures abort it.

pub mod node;
pub mod rpc;
pub mod scan;
pub mod store;
pub mod utils;

#[cfg(test)]
mod tests;
