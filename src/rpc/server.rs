use axum::{
    extract::Query,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use crate::rpc::handlers::{scan_route, ScanEndpoint, ScanHandler};
use crate::utils::metrics::METRICS;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// ScanServer ties together the HTTP listener, the scan routes and the shared handler.
pub struct ScanServer {
    addr: SocketAddr,
    handler: ScanHandler,
    endpoints: Vec<Arc<ScanEndpoint>>,
}

impl ScanServer {
    pub fn new(addr: SocketAddr, handler: ScanHandler, endpoints: Vec<ScanEndpoint>) -> Self {
        Self { addr, handler, endpoints: endpoints.into_iter().map(Arc::new).collect() }
    }

    /// Build the router: one GET route per endpoint plus /health and /metrics.
    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/metrics", get(metrics_handler));

        for ep in &self.endpoints {
            let handler = self.handler.clone();
            let ep = ep.clone();
            let path = ep.path().to_string();
            app = app.route(
                &path,
                get(move |Query(query): Query<HashMap<String, String>>| {
                    let handler = handler.clone();
                    let ep = ep.clone();
                    async move { scan_route(handler, ep, query).await }
                }),
            );
        }

        app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind and serve until `shutdown` flips to true. In-flight scans are cancelled first so
    /// graceful shutdown does not wait on long keyspace walks.
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Starting scan server on {}", listener.local_addr()?);

        let cancel = self.handler.shutdown_token().clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
                info!("scan server observed shutdown");
                cancel.cancel();
            })
            .await?;
        Ok(())
    }
}

async fn metrics_handler() -> String {
    METRICS.render()
}
