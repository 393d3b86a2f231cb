use crate::node::config::EndpointConfig;
use crate::scan::{parse_cursor, CursorError, PatternError, PatternTemplate, ScanEngine, ScanError, ScanRequest};
use crate::store::KeyStore;
use crate::utils::metrics::{self, METRICS};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// JSON body of a successful scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanResponse {
    pub keys: Vec<String>,
    pub cursor: u64,
}

/// Request failures and their HTTP mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    BadCursor(#[from] CursorError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadCursor(_) => StatusCode::BAD_REQUEST,
            ApiError::Scan(ScanError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Scan(ScanError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Scan(ScanError::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// A configured endpoint with its template already parsed.
#[derive(Debug, Clone)]
pub struct ScanEndpoint {
    cfg: EndpointConfig,
    template: PatternTemplate,
}

impl ScanEndpoint {
    pub fn new(cfg: EndpointConfig) -> Result<Self, PatternError> {
        let template = PatternTemplate::parse(&cfg.pattern)?;
        Ok(Self { cfg, template })
    }

    pub fn path(&self) -> &str {
        &self.cfg.path
    }

    pub fn callbacks(&self) -> &[String] {
        &self.cfg.callbacks
    }

    /// Build the glob for a request. Missing parameters substitute an empty string.
    pub fn pattern_for(&self, query: &HashMap<String, String>) -> String {
        let get = |name: &str| query.get(name).map(String::as_str).unwrap_or_default();
        self.template.render(
            &self.cfg.entity,
            get(&self.cfg.env_param),
            get(&self.cfg.parent_param),
            get(&self.cfg.child_param),
        )
    }

    pub fn cursor_for(&self, query: &HashMap<String, String>) -> Result<u64, CursorError> {
        parse_cursor(query.get("cursor").map(String::as_str), self.cfg.cursor_policy)
    }
}

/// Shared state behind every scan route.
#[derive(Clone)]
pub struct ScanHandler {
    engine: Arc<ScanEngine>,
    store: Arc<dyn KeyStore>,
    shutdown: CancellationToken,
    scan_timeout: Option<Duration>,
}

impl ScanHandler {
    pub fn new(engine: Arc<ScanEngine>, store: Arc<dyn KeyStore>, shutdown: CancellationToken) -> Self {
        Self { engine, store, shutdown, scan_timeout: None }
    }

    pub fn with_scan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Cancelling this token aborts every in-flight scan.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Run one scan for `endpoint` using the request's query parameters.
    pub async fn scan(&self, endpoint: &ScanEndpoint, query: &HashMap<String, String>) -> Result<ScanResponse, ApiError> {
        METRICS.inc_counter(metrics::SCAN_REQUESTS);
        let cursor = endpoint.cursor_for(query)?;
        let pattern = endpoint.pattern_for(query);
        debug!(path = endpoint.path(), %pattern, cursor, callbacks = ?endpoint.callbacks(), "scan request");

        let deadline = self.scan_timeout.map(|t| tokio::time::Instant::now() + t);
        let req = ScanRequest::new(&pattern, cursor, self.store.as_ref())
            .with_callbacks(endpoint.callbacks())
            .with_cancel(self.shutdown.child_token())
            .with_deadline(deadline);

        let in_flight = METRICS.track(metrics::SCANS_IN_FLIGHT);
        let res = self.engine.scan(req).await;
        drop(in_flight);
        match res {
            Ok(out) => Ok(ScanResponse { keys: out.keys, cursor: out.cursor }),
            Err(e) => {
                error!(path = endpoint.path(), %pattern, error = %e, "scan failed");
                Err(e.into())
            }
        }
    }
}

/// axum handler body shared by every configured scan route.
pub async fn scan_route(handler: ScanHandler, endpoint: Arc<ScanEndpoint>, query: HashMap<String, String>) -> Response {
    match handler.scan(&endpoint, &query).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}
