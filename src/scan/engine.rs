//! Scan engine: walks the keyspace one page at a time and dispatches callbacks per key.
//!
//! Pages are fetched strictly in sequence and each key's callbacks complete before the next
//! key is processed. A store failure on any page aborts the whole scan; callback failures are
//! logged and counted but never abort it. Cancellation and the optional deadline are checked
//! before every page and raced against the page fetch itself.
//!
//! Only the last page's keys are returned. Callers that want every key paginate themselves by
//! passing the returned cursor back in.

use crate::scan::callbacks::CallbackRegistry;
use crate::store::{KeyStore, StoreError, DEFAULT_PAGE_HINT};
use crate::utils::metrics::{self, METRICS};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    /// A page request failed; the scan is abandoned with no partial result.
    #[error("error during scan: {0}")]
    Store(#[from] StoreError),

    #[error("scan cancelled")]
    Cancelled,

    #[error("scan deadline exceeded")]
    DeadlineExceeded,
}

/// Inputs for one scan invocation.
pub struct ScanRequest<'a> {
    pub pattern: &'a str,
    /// `0` starts a fresh scan; otherwise a cursor returned by an earlier page.
    pub cursor: u64,
    pub store: &'a dyn KeyStore,
    /// Callback identifiers, invoked in this order for every key. Unknown ones are skipped.
    pub callbacks: &'a [String],
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl<'a> ScanRequest<'a> {
    pub fn new(pattern: &'a str, cursor: u64, store: &'a dyn KeyStore) -> Self {
        Self {
            pattern,
            cursor,
            store,
            callbacks: &[],
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: &'a [String]) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Keys of the page that produced the terminal cursor.
    pub keys: Vec<String>,
    /// Always `0` for a completed scan.
    pub cursor: u64,
    pub pages: u64,
    pub callback_failures: u64,
}

#[derive(Debug, Clone)]
pub struct ScanEngine {
    registry: Arc<CallbackRegistry>,
    page_hint: usize,
}

impl ScanEngine {
    pub fn new(registry: Arc<CallbackRegistry>, page_hint: usize) -> Self {
        Self { registry, page_hint: page_hint.max(1) }
    }

    pub fn with_default_hint(registry: Arc<CallbackRegistry>) -> Self {
        Self::new(registry, DEFAULT_PAGE_HINT)
    }

    pub async fn scan(&self, req: ScanRequest<'_>) -> Result<ScanOutcome, ScanError> {
        let mut cursor = req.cursor;
        let mut pages = 0u64;
        let mut callback_failures = 0u64;

        loop {
            if req.cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            if let Some(d) = req.deadline {
                if Instant::now() >= d {
                    return Err(ScanError::DeadlineExceeded);
                }
            }

            let page = tokio::select! {
                biased;
                _ = req.cancel.cancelled() => return Err(ScanError::Cancelled),
                _ = sleep_until_opt(req.deadline) => return Err(ScanError::DeadlineExceeded),
                res = req.store.scan_page(cursor, req.pattern, self.page_hint) => res,
            };
            let page = page.map_err(|e| {
                METRICS.inc_counter(metrics::SCAN_FAILURES);
                warn!(pattern = req.pattern, cursor, error = %e, "page request failed");
                e
            })?;
            pages += 1;
            METRICS.inc_counter(metrics::SCAN_PAGES);
            debug!(pattern = req.pattern, cursor, next = page.cursor, keys = page.keys.len(), "page fetched");

            for key in &page.keys {
                callback_failures += self.dispatch(req.store, key, req.callbacks).await;
            }

            cursor = page.cursor;
            if cursor == 0 {
                return Ok(ScanOutcome { keys: page.keys, cursor, pages, callback_failures });
            }
        }
    }

    /// Run every requested callback for one key; returns how many failed.
    async fn dispatch(&self, store: &dyn KeyStore, key: &str, ids: &[String]) -> u64 {
        let mut failed = 0;
        for id in ids {
            let Some(cb) = self.registry.lookup(id) else {
                continue;
            };
            METRICS.inc_counter(metrics::CALLBACK_INVOCATIONS);
            match cb.invoke(store, key).await {
                Ok(v) => debug!(callback = %id, key, result = %v, "callback done"),
                Err(e) => {
                    failed += 1;
                    METRICS.inc_counter(metrics::CALLBACK_FAILURES);
                    warn!(callback = %id, key, error = %e, "error executing callback");
                }
            }
        }
        failed
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
