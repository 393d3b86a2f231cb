use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a store engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable or authentication rejected while opening the handle.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A command against an open handle failed.
    #[error("store command failed: {0}")]
    Command(String),

    /// The glob pattern could not be compiled by the engine.
    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// One batch of keys plus the cursor to continue from (`0` once the scan is complete).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    pub cursor: u64,
}

impl ScanPage {
    pub fn new(keys: Vec<String>, cursor: u64) -> Self {
        Self { keys, cursor }
    }

    /// Page from binary-safe keys. Invalid UTF-8 is replaced with U+FFFD rather than failing
    /// the page.
    pub fn from_raw_keys(keys: Vec<Vec<u8>>, cursor: u64) -> Self {
        let keys = keys.into_iter().map(|k| String::from_utf8_lossy(&k).into_owned()).collect();
        Self { keys, cursor }
    }

    /// True when this page carries the terminal cursor.
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// Key-value store handle shared across concurrent scans.
///
/// Implementations must be safe for concurrent use; callers take no locks of their own.
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Fetch one page of keys matching `pattern`, resuming at `cursor`.
    ///
    /// Pattern matching happens inside the store. `count_hint` is advisory: a page may hold
    /// more or fewer keys, and may be empty before the scan is complete.
    async fn scan_page(&self, cursor: u64, pattern: &str, count_hint: usize) -> Result<ScanPage, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Refresh the key's last-access time; returns whether it existed.
    async fn touch(&self, key: &str) -> Result<bool, StoreError>;

    /// Round-trip check used when the handle is opened.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_keys_survive_invalid_utf8() {
        let page = ScanPage::from_raw_keys(vec![b"user:1".to_vec(), vec![b'k', 0xff]], 7);
        assert_eq!(page.keys, vec!["user:1".to_string(), "k\u{fffd}".to_string()]);
        assert_eq!(page.cursor, 7);
        assert!(!page.is_last());
    }
}
