//! In-memory store engine for local dev and tests.
//!
//! Keys live in a sorted map. Cursors are opaque handles into a bounded table of resume
//! positions, so keys deleted behind the cursor (e.g. by an `unlink` callback) never shift the
//! remainder of the scan. A cursor is consumed by the page request that uses it, so the table
//! only holds scans that are still in progress; past `MAX_LIVE_CURSORS` of those the oldest is
//! dropped and its next page fails with "invalid cursor".
//!
//! Glob matching follows Redis `MATCH` rules closely enough for `*`, `?`, `[...]` and backslash
//! escapes; `*` crosses `:` separators and braces are literal characters.

use crate::store::traits::{KeyStore, ScanPage, StoreError};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Issued cursors kept before the oldest are forgotten.
const MAX_LIVE_CURSORS: usize = 4096;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    accessed: Instant,
}

impl Entry {
    fn new(value: Vec<u8>) -> Self {
        Self { value, accessed: Instant::now() }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    // cursor -> last key examined by the page that issued it; ids grow, so first is oldest
    cursors: BTreeMap<u64, String>,
    next_cursor: u64,
}

impl Inner {
    fn issue_cursor(&mut self, resume_after: String) -> u64 {
        self.next_cursor = self.next_cursor.wrapping_add(1);
        if self.next_cursor == 0 {
            self.next_cursor = 1;
        }
        let id = self.next_cursor;
        self.cursors.insert(id, resume_after);
        while self.cursors.len() > MAX_LIVE_CURSORS {
            self.cursors.pop_first();
        }
        id
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    inner: Mutex<Inner>,
    scan_calls: AtomicUsize,
    failures_pending: AtomicUsize,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding `keys`, each with an empty value.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            for k in keys {
                inner.entries.insert(k.into(), Entry::new(Vec::new()));
            }
        }
        store
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.inner.lock().entries.insert(key.into(), Entry::new(value.into()));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Time since the key was last touched, like `OBJECT IDLETIME`.
    pub fn idle_time(&self, key: &str) -> Option<Duration> {
        self.inner.lock().entries.get(key).map(|e| e.accessed.elapsed())
    }

    /// Number of `scan_page` calls served so far, including failed ones.
    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    /// Make the next `n` `scan_page` requests fail with a command error.
    pub fn fail_next_scans(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    pub fn live_cursors(&self) -> usize {
        self.inner.lock().cursors.len()
    }
}

/// Escape unescaped `{` and `}` outside character classes: globset reads them as alternation,
/// Redis as plain characters.
fn literal_braces(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                // a leading ']' (after an optional negation) is a member, not the close
                if let Some(&n) = chars.peek() {
                    if n == '!' || n == '^' {
                        out.push(n);
                        chars.next();
                    }
                }
                if chars.peek() == Some(&']') {
                    out.push(']');
                    chars.next();
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '{' | '}' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, StoreError> {
    GlobBuilder::new(&literal_braces(pattern))
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| StoreError::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() })
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn name(&self) -> String {
        "memory".into()
    }

    async fn scan_page(&self, cursor: u64, pattern: &str, count_hint: usize) -> Result<ScanPage, StoreError> {
        let call = self.scan_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Command(format!("injected failure on scan call {}", call)));
        }

        let matcher = compile_glob(pattern)?;
        let mut inner = self.inner.lock();

        let resume_after = match cursor {
            0 => None,
            c => Some(
                inner
                    .cursors
                    .remove(&c)
                    .ok_or_else(|| StoreError::Command(format!("invalid cursor {}", c)))?,
            ),
        };
        let lower = match &resume_after {
            Some(after) => Bound::Excluded(after.as_str()),
            None => Bound::Unbounded,
        };

        let mut keys = Vec::new();
        let mut last_examined = None;
        for (k, _) in inner
            .entries
            .range::<str, _>((lower, Bound::Unbounded))
            .take(count_hint.max(1))
        {
            if matcher.is_match(k.as_str()) {
                keys.push(k.clone());
            }
            last_examined = Some(k.clone());
        }

        let next = match last_examined {
            Some(last) => {
                let more = inner
                    .entries
                    .range::<str, _>((Bound::Excluded(last.as_str()), Bound::Unbounded))
                    .next()
                    .is_some();
                if more { inner.issue_cursor(last) } else { 0 }
            }
            None => 0,
        };

        Ok(ScanPage::new(keys, next))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.insert(key, value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.contains(key))
    }

    async fn touch(&self, key: &str) -> Result<bool, StoreError> {
        match self.inner.lock().entries.get_mut(key) {
            Some(e) => {
                e.accessed = Instant::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
