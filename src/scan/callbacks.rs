//! Callback registry: identifier -> per-key side-effect handler.
//!
//! The registry is built once (usually `CallbackRegistry::with_builtins()`), wrapped in an
//! `Arc`, and handed to every scan. It is never mutated after that point.

use crate::store::KeyStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A handler invoked once per matched key.
///
/// The returned value is opaque to the scan engine; an error is logged and otherwise ignored.
#[async_trait]
pub trait ScanCallback: Send + Sync + 'static {
    async fn invoke(&self, store: &dyn KeyStore, key: &str) -> Result<Value>;
}

#[derive(Default, Clone)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Arc<dyn ScanCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in callback.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register("log", LogKey);
        r.register("exists", KeyExists);
        r.register("touch", TouchKey);
        r.register("unlink", UnlinkKey);
        r.register("get", GetValue);
        r
    }

    /// Add or replace the callback under `identifier`.
    pub fn register<C: ScanCallback>(&mut self, identifier: impl Into<String>, callback: C) -> &mut Self {
        self.callbacks.insert(identifier.into(), Arc::new(callback));
        self
    }

    pub fn lookup(&self, identifier: &str) -> Option<Arc<dyn ScanCallback>> {
        self.callbacks.get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.callbacks.contains_key(identifier)
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.callbacks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry").field("identifiers", &self.identifiers()).finish()
    }
}

/// `log`: emit the key as an info event.
pub struct LogKey;

#[async_trait]
impl ScanCallback for LogKey {
    async fn invoke(&self, _store: &dyn KeyStore, key: &str) -> Result<Value> {
        info!(key, "matched key");
        Ok(json!(key))
    }
}

/// `exists`: report whether the key is still present.
pub struct KeyExists;

#[async_trait]
impl ScanCallback for KeyExists {
    async fn invoke(&self, store: &dyn KeyStore, key: &str) -> Result<Value> {
        Ok(json!(store.exists(key).await?))
    }
}

/// `touch`: refresh the key's last-access time.
pub struct TouchKey;

#[async_trait]
impl ScanCallback for TouchKey {
    async fn invoke(&self, store: &dyn KeyStore, key: &str) -> Result<Value> {
        if !store.touch(key).await? {
            return Err(anyhow!("key {} vanished before touch", key));
        }
        Ok(json!(true))
    }
}

/// `unlink`: delete the key.
pub struct UnlinkKey;

#[async_trait]
impl ScanCallback for UnlinkKey {
    async fn invoke(&self, store: &dyn KeyStore, key: &str) -> Result<Value> {
        Ok(json!(store.delete(key).await?))
    }
}

/// `get`: read the value as UTF-8 text.
pub struct GetValue;

#[async_trait]
impl ScanCallback for GetValue {
    async fn invoke(&self, store: &dyn KeyStore, key: &str) -> Result<Value> {
        let raw = store.get(key).await?.ok_or_else(|| anyhow!("key {} has no value", key))?;
        Ok(json!(String::from_utf8(raw)?))
    }
}
