//! Integration tests: drive the scan routes end to end over the in-memory store.

use std::sync::Arc;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use crate::node::config::{EndpointConfig, ServiceConfig};
use crate::node::Node;
use crate::rpc::{ScanEndpoint, ScanHandler, ScanResponse, ScanServer};
use crate::scan::{CallbackRegistry, CursorPolicy, ScanCallback, ScanEngine};
use crate::store::{KeyStore, MemoryKeyStore};

#[derive(Default, Clone)]
struct Visited {
    keys: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ScanCallback for Visited {
    async fn invoke(&self, _store: &dyn KeyStore, key: &str) -> anyhow::Result<Value> {
        self.keys.lock().push(key.to_string());
        Ok(Value::Null)
    }
}

fn sessions_endpoint(callbacks: &[&str], policy: CursorPolicy) -> ScanEndpoint {
    ScanEndpoint::new(EndpointConfig {
        path: "/sessions".into(),
        env_param: "env".into(),
        parent_param: "team".into(),
        child_param: "sub".into(),
        entity: "session".into(),
        pattern: "user:%s:%s:%s:%s".into(),
        callbacks: callbacks.iter().map(|s| s.to_string()).collect(),
        cursor_policy: policy,
    })
    .unwrap()
}

fn app(store: Arc<MemoryKeyStore>, registry: CallbackRegistry, page_hint: usize, ep: ScanEndpoint) -> Router {
    let engine = Arc::new(ScanEngine::new(Arc::new(registry), page_hint));
    let handler = ScanHandler::new(engine, store, CancellationToken::new());
    ScanServer::new("127.0.0.1:0".parse().unwrap(), handler, vec![ep]).router()
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn seeded_store() -> Arc<MemoryKeyStore> {
    Arc::new(MemoryKeyStore::with_keys([
        "user:session:prod:teamA:teamB",
        "user:session:prod:teamA:teamC",
        "user:session:dev:teamA:teamB",
        "order:1",
    ]))
}

#[tokio::test]
async fn test_scan_route_returns_keys_and_runs_callbacks() {
    let visited = Visited::default();
    let mut registry = CallbackRegistry::new();
    registry.register("touch", visited.clone());
    let ep = sessions_endpoint(&["touch", "bogus"], CursorPolicy::Restart);

    let (status, body) = get(app(seeded_store(), registry, 10, ep), "/sessions?env=prod&team=teamA&sub=*").await;

    assert_eq!(status, StatusCode::OK);
    let resp: ScanResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.cursor, 0);
    assert_eq!(resp.keys, vec!["user:session:prod:teamA:teamB", "user:session:prod:teamA:teamC"]);
    assert_eq!(*visited.keys.lock(), resp.keys);
}

#[tokio::test]
async fn test_response_shape_is_keys_and_cursor() {
    let ep = sessions_endpoint(&[], CursorPolicy::Restart);
    let (_, body) = get(app(seeded_store(), CallbackRegistry::new(), 10, ep), "/sessions?env=nope&team=x&sub=y").await;
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v, serde_json::json!({"keys": [], "cursor": 0}));
}

#[tokio::test]
async fn test_only_last_page_keys_are_returned() {
    let store = Arc::new(MemoryKeyStore::with_keys((0..12).map(|i| format!("user:session:prod:t:{:02}", i))));
    let visited = Visited::default();
    let mut registry = CallbackRegistry::new();
    registry.register("touch", visited.clone());
    let ep = sessions_endpoint(&["touch"], CursorPolicy::Restart);

    let (status, body) = get(app(store, registry, 5, ep), "/sessions?env=prod&team=t&sub=*").await;

    assert_eq!(status, StatusCode::OK);
    let resp: ScanResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.keys, vec!["user:session:prod:t:10", "user:session:prod:t:11"]);
    // callbacks still covered the whole keyspace
    assert_eq!(visited.keys.lock().len(), 12);
}

#[tokio::test]
async fn test_cursor_param_resumes_scan() {
    let store = Arc::new(MemoryKeyStore::with_keys((0..12).map(|i| format!("user:session:prod:t:{:02}", i))));
    let first = store.scan_page(0, "user:session:prod:t:*", 5).await.unwrap();
    assert_ne!(first.cursor, 0);

    let visited = Visited::default();
    let mut registry = CallbackRegistry::new();
    registry.register("touch", visited.clone());
    let ep = sessions_endpoint(&["touch"], CursorPolicy::Reject);

    let uri = format!("/sessions?env=prod&team=t&sub=*&cursor={}", first.cursor);
    let (status, _) = get(app(store, registry, 5, ep), &uri).await;

    assert_eq!(status, StatusCode::OK);
    let seen = visited.keys.lock().clone();
    assert_eq!(seen.len(), 7);
    assert!(seen.iter().all(|k| !first.keys.contains(k)));
}

#[tokio::test]
async fn test_malformed_cursor_restart_policy() {
    let visited = Visited::default();
    let mut registry = CallbackRegistry::new();
    registry.register("touch", visited.clone());
    let ep = sessions_endpoint(&["touch"], CursorPolicy::Restart);

    let (status, _) = get(app(seeded_store(), registry, 10, ep), "/sessions?env=dev&team=teamA&sub=teamB&cursor=banana").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(*visited.keys.lock(), vec!["user:session:dev:teamA:teamB".to_string()]);
}

#[tokio::test]
async fn test_malformed_cursor_reject_policy() {
    let ep = sessions_endpoint(&[], CursorPolicy::Reject);
    let (status, body) = get(app(seeded_store(), CallbackRegistry::new(), 10, ep), "/sessions?env=dev&cursor=-3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("malformed cursor"));
}

#[tokio::test]
async fn test_store_failure_is_500_with_error_text() {
    let store = seeded_store();
    store.fail_next_scans(1);
    let ep = sessions_endpoint(&[], CursorPolicy::Restart);

    let (status, body) = get(app(store, CallbackRegistry::new(), 10, ep), "/sessions?env=prod&team=teamA&sub=*").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("error during scan"), "unexpected body: {}", text);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let ep = sessions_endpoint(&[], CursorPolicy::Restart);
    let router = app(seeded_store(), CallbackRegistry::new(), 10, ep);

    let (_, _) = get(router.clone(), "/sessions?env=prod&team=teamA&sub=*").await;
    let (status, body) = get(router.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    let (status, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("keyscan_scan_requests_total"));
    assert!(text.contains("keyscan_scan_pages_total"));
}

#[tokio::test]
async fn test_node_starts_and_shuts_down() {
    let cfg = ServiceConfig::from_toml_str(
        r#"
listen = "127.0.0.1:0"

[store]
seed = ["user:session:prod:a:b"]

[[endpoint]]
path = "/sessions"
env_param = "env"
parent_param = "team"
child_param = "sub"
entity = "session"
pattern = "user:%s:%s:%s:%s"
callbacks = ["log"]
"#,
    )
    .unwrap();

    let svc = Node::new(cfg).start().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    tokio_test::assert_ok!(svc.shutdown().await);
}

#[tokio::test]
async fn test_node_rejects_invalid_config() {
    let mut cfg = ServiceConfig::default();
    cfg.listen = "127.0.0.1:0".into();
    cfg.store.page_hint = 0;
    assert!(Node::new(cfg).start().await.is_err());
}
