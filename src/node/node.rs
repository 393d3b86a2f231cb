//! Service orchestration: open the store, build the callback registry and engine, start the
//! HTTP server, and hand back a `ServiceHandle` for graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use crate::node::config::{ConfigError, ServiceConfig};
use crate::node::service_handle::ServiceHandle;
use crate::rpc::{ScanEndpoint, ScanHandler, ScanServer};
use crate::scan::{CallbackRegistry, ScanEngine};
use crate::utils::Result;

/// Main service object
pub struct Node {
    cfg: ServiceConfig,
    registry: Arc<CallbackRegistry>,
}

impl Node {
    /// Node with the built-in callbacks.
    pub fn new(cfg: ServiceConfig) -> Self {
        Self::with_registry(cfg, CallbackRegistry::with_builtins())
    }

    /// Node with a caller-assembled registry. The registry is frozen from here on.
    pub fn with_registry(cfg: ServiceConfig, registry: CallbackRegistry) -> Self {
        Self { cfg, registry: Arc::new(registry) }
    }

    /// Start the service: spawn the server and return ServiceHandle for graceful shutdown.
    pub async fn start(self) -> Result<ServiceHandle> {
        for w in self.cfg.validate(&self.registry)? {
            warn!("{}", w);
        }
        let addr: SocketAddr = self
            .cfg
            .listen
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid(format!("listen address {}: {}", self.cfg.listen, e)))?;

        let (mut svc_handle, shutdown_rx) = ServiceHandle::new();

        // Connection failures here are fatal to the process.
        let store = crate::store::open(&self.cfg.store).await?;

        let engine = Arc::new(ScanEngine::new(self.registry.clone(), self.cfg.store.page_hint));
        let handler = ScanHandler::new(engine, store, CancellationToken::new())
            .with_scan_timeout(self.cfg.scan_timeout_ms.map(Duration::from_millis));

        let mut endpoints = Vec::with_capacity(self.cfg.endpoints.len());
        for ep in &self.cfg.endpoints {
            endpoints.push(ScanEndpoint::new(ep.clone())?);
            info!(path = %ep.path, pattern = %ep.pattern, callbacks = ?ep.callbacks, "scan endpoint registered");
        }

        let server = ScanServer::new(addr, handler, endpoints);
        let h: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
            if let Err(e) = server.start(shutdown_rx).await {
                error!("scan server failed: {:?}", e);
                return Err(e);
            }
            Ok(())
        });
        svc_handle.attach(h);

        info!("keyscan started, listening on {}", addr);
        Ok(svc_handle)
    }
}
