//! Store module: the key-value collaborator the scan engine enumerates.
//!
//! Engines: in-memory (always built), Redis (feature "redis-store").
//! Use `store::open(&StoreConfig)` to create an Arc<dyn KeyStore> to pass to other modules.

pub mod traits;
pub mod memory_store;

#[cfg(feature = "redis-store")]
pub mod redis_store;

pub use traits::{KeyStore, ScanPage, StoreError};
pub use memory_store::MemoryKeyStore;

#[cfg(feature = "redis-store")]
pub use redis_store::RedisKeyStore;

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Page size hint used when none is configured.
pub const DEFAULT_PAGE_HINT: usize = 10;

/// Engine selection enum
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    #[default]
    Memory,
    Redis,
}

/// Connection settings for the store collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub engine: StoreEngine,
    /// Connection target, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Advisory number of keys per `scan_page` request.
    pub page_hint: usize,
    /// Keys preloaded into the in-memory engine.
    pub seed: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: StoreEngine::Memory,
            url: "redis://127.0.0.1:6379".into(),
            username: None,
            password: None,
            page_hint: DEFAULT_PAGE_HINT,
            seed: Vec::new(),
        }
    }
}

/// Open a store handle and check it answers before returning.
///
/// Any failure here is a connection failure and is fatal to the caller.
pub async fn open(cfg: &StoreConfig) -> Result<Arc<dyn KeyStore>, StoreError> {
    let store: Arc<dyn KeyStore> = match cfg.engine {
        StoreEngine::Memory => Arc::new(MemoryKeyStore::with_keys(cfg.seed.iter().cloned())),
        #[cfg(feature = "redis-store")]
        StoreEngine::Redis => Arc::new(
            RedisKeyStore::connect(&cfg.url, cfg.username.as_deref(), cfg.password.as_deref()).await?,
        ),
        #[cfg(not(feature = "redis-store"))]
        StoreEngine::Redis => {
            return Err(StoreError::Connection(
                "redis engine requested but keyscan was built without the redis-store feature".into(),
            ))
        }
    };
    store.ping().await?;
    info!(engine = %store.name(), "store opened");
    Ok(store)
}
