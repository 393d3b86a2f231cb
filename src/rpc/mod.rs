//! HTTP module
//!
//! - One GET scan route per configured endpoint: dynamic query params + `cursor`
//! - Diagnostic endpoints: /health, /metrics
//!
//! To integrate: build a `ScanHandler` (engine + store + shutdown token), turn each
//! `EndpointConfig` into a `ScanEndpoint`, and pass both to `ScanServer::new()`.

pub mod server;
pub mod handlers;

pub use server::ScanServer;
pub use handlers::{ApiError, ScanEndpoint, ScanHandler, ScanResponse};
