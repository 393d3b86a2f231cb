use thiserror::Error;
use crate::node::config::ConfigError;
use crate::scan::{CursorError, PatternError, ScanError};
use crate::store::StoreError;

/// Unified error type for the service edges (CLI, node wiring)
#[derive(Error, Debug)]
pub enum KeyscanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid pattern template: {0}")]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, KeyscanError>;
