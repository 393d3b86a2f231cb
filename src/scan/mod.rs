//! Scan module
//!
//! - `engine`: cursor-driven scan loop with per-key callback dispatch
//! - `callbacks`: immutable callback registry and the built-in callbacks
//! - `pattern`: `%s` pattern templates
//! - `cursor`: caller cursor parsing and the malformed-cursor policy

pub mod engine;
pub mod callbacks;
pub mod pattern;
pub mod cursor;

pub use engine::{ScanEngine, ScanError, ScanOutcome, ScanRequest};
pub use callbacks::{CallbackRegistry, ScanCallback};
pub use pattern::{PatternError, PatternTemplate};
pub use cursor::{parse_cursor, CursorError, CursorPolicy};
