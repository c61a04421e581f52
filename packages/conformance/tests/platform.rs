//! End-to-end conformance tests for the Lattice platform server.
//!
//! Each test spawns an ephemeral in-process server (real TCP, real HTTP)
//! via [`lattice_conformance::spawn_platform`] and exercises the REST↔bus
//! bridge surface with a `reqwest` client.
//!
//! # Coverage
//!
//! | Test | Behavior |
//! |------|----------|
//! | `bridged_get_round_trips_through_the_service` | exact bridge, correlated echo |
//! | `bridge_with_no_service_times_out_as_504` | bridge timeout |
//! | `clear_then_attach_switches_the_backing_channel` | re-bridge replacement |
//! | `cleared_endpoints_stop_matching` | clear removes routes, others live on |
//! | `prefix_bridge_catches_all_sub_paths` | prefix bridge + unrelated 404 |
//! | `wrong_method_is_not_routed` | method-restricted exact bridges |
//! | `static_route_serves_files` | static mount, headers, bare-prefix 404 |
//! | `graceful_shutdown_runs_hooks_and_notifies` | stop timing + readiness `false` |
//! | `stop_is_idempotent` | double stop no-op |
//! | `tls_customization_is_rejected_while_running` | TLS gate |
//! | `availability_tracks_the_lifecycle` | availability flags |

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::Method;
use lattice_bus::{EventBus, Message};
use lattice_conformance::{spawn_platform, spawn_platform_with, test_config};
use lattice_server::{BridgeConfig, BridgeRequest, FabricService, ServerError};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Value of a query parameter, e.g. `q` in `GET /echo?q=hi`.
fn query_param(req: &BridgeRequest, name: &str) -> Option<String> {
    req.uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Responds to every request with the request's own payload.
struct EchoService;

#[async_trait]
impl FabricService for EchoService {
    async fn handle_service_request(&self, request: Message, bus: Arc<dyn EventBus>) {
        let reply = Message::response(&request.channel, request.id, request.payload.clone());
        bus.send_response(reply).await.unwrap();
    }
}

/// Responds to every request with a fixed tag, so tests can tell which
/// channel served them.
struct TagService(&'static str);

#[async_trait]
impl FabricService for TagService {
    async fn handle_service_request(&self, request: Message, bus: Arc<dyn EventBus>) {
        let reply = Message::response(&request.channel, request.id, json!(self.0));
        bus.send_response(reply).await.unwrap();
    }
}

/// Sleeps in its shutdown hook, to make drain timing observable.
struct SlowShutdownService(Duration);

#[async_trait]
impl FabricService for SlowShutdownService {
    async fn handle_service_request(&self, _request: Message, _bus: Arc<dyn EventBus>) {}

    async fn on_server_shutdown(&self) {
        tokio::time::sleep(self.0).await;
    }
}

// ---------------------------------------------------------------------------
// Exact bridges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bridged_get_round_trips_through_the_service() {
    let platform = spawn_platform().await;
    let client = make_client();

    platform
        .server
        .register_service(Arc::new(EchoService), "echo")
        .unwrap();
    platform.server.set_http_channel_bridge(BridgeConfig::new(
        "echo",
        "/echo",
        Method::GET,
        |req| Message::request("echo", json!(query_param(req, "q"))),
    ));

    let started = Instant::now();
    let resp = client
        .get(format!("{}/echo?q=hi", platform.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!("hi"));
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "bridge round trip took {:?}",
        started.elapsed()
    );

    platform.shut_down().await;
}

#[tokio::test]
async fn wrong_method_is_not_routed() {
    let platform = spawn_platform().await;
    let client = make_client();

    platform
        .server
        .register_service(Arc::new(EchoService), "echo")
        .unwrap();
    platform.server.set_http_channel_bridge(BridgeConfig::new(
        "echo",
        "/echo",
        Method::GET,
        |_req| Message::request("echo", Value::Null),
    ));

    let resp = client
        .post(format!("{}/echo", platform.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    platform.shut_down().await;
}

#[tokio::test]
async fn bridge_with_no_service_times_out_as_504() {
    let mut config = test_config();
    config.rest_bridge_timeout = Duration::from_secs(1);
    let platform = spawn_platform_with(config).await;
    let client = make_client();

    platform.server.set_http_channel_bridge(BridgeConfig::new(
        "nobody-home",
        "/slow",
        Method::GET,
        |_req| Message::request("nobody-home", Value::Null),
    ));

    let started = Instant::now();
    let resp = client
        .get(format!("{}/slow", platform.base_url))
        .send()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(resp.status(), 504);
    assert!(elapsed >= Duration::from_secs(1), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2500), "returned after {elapsed:?}");

    platform.shut_down().await;
}

// ---------------------------------------------------------------------------
// Re-bridging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clear_then_attach_switches_the_backing_channel() {
    let platform = spawn_platform().await;
    let client = make_client();

    platform
        .server
        .register_service(Arc::new(TagService("A")), "chan-a")
        .unwrap();
    platform
        .server
        .register_service(Arc::new(TagService("B")), "chan-b")
        .unwrap();

    platform.server.set_http_channel_bridge(BridgeConfig::new(
        "chan-a",
        "/v1",
        Method::POST,
        |_req| Message::request("chan-a", Value::Null),
    ));

    let resp = client.post(format!("{}/v1", platform.base_url)).send().await.unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), json!("A"));

    platform.server.clear_http_channel_bridges("chan-a");
    platform.server.set_http_channel_bridge(BridgeConfig::new(
        "chan-b",
        "/v1",
        Method::POST,
        |_req| Message::request("chan-b", Value::Null),
    ));

    let resp = client.post(format!("{}/v1", platform.base_url)).send().await.unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), json!("B"));

    platform.shut_down().await;
}

#[tokio::test]
async fn cleared_endpoints_stop_matching() {
    let platform = spawn_platform().await;
    let client = make_client();

    platform
        .server
        .register_service(Arc::new(TagService("gone")), "doomed")
        .unwrap();
    platform
        .server
        .register_service(Arc::new(TagService("alive")), "survivor")
        .unwrap();

    platform.server.set_http_channel_bridge(BridgeConfig::new(
        "doomed",
        "/doomed",
        Method::GET,
        |_req| Message::request("doomed", Value::Null),
    ));
    platform.server.set_http_channel_bridge(BridgeConfig::new(
        "survivor",
        "/survivor",
        Method::GET,
        |_req| Message::request("survivor", Value::Null),
    ));

    platform.server.clear_http_channel_bridges("doomed");

    let resp = client.get(format!("{}/doomed", platform.base_url)).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client.get(format!("{}/survivor", platform.base_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!("alive"));

    platform.shut_down().await;
}

// ---------------------------------------------------------------------------
// Prefix bridges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prefix_bridge_catches_all_sub_paths() {
    let platform = spawn_platform().await;
    let client = make_client();

    platform
        .server
        .register_service(Arc::new(EchoService), "files")
        .unwrap();
    platform
        .server
        .set_http_path_prefix_channel_bridge(BridgeConfig::new(
            "files",
            "/files",
            Method::GET,
            |req| Message::request("files", json!(req.uri.path())),
        ));

    // The full path reaches the service untouched.
    let resp = client
        .get(format!("{}/files/a/b/c", platform.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!("/files/a/b/c"));

    // Any method is accepted.
    let resp = client
        .delete(format!("{}/files/x", platform.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/unrelated", platform.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    platform.shut_down().await;
}

// ---------------------------------------------------------------------------
// Static routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn static_route_serves_files() {
    let platform = spawn_platform().await;
    let client = make_client();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "from disk").unwrap();
    platform.server.set_static_route("/assets", dir.path(), Vec::new());

    let resp = client
        .get(format!("{}/assets/hello.txt", platform.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    assert_eq!(resp.text().await.unwrap(), "from disk");

    // Bare prefix without the trailing slash is a 404, not a redirect.
    let resp = client
        .get(format!("{}/assets", platform.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    platform.shut_down().await;
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn graceful_shutdown_runs_hooks_and_notifies() {
    let mut config = test_config();
    config.shutdown_timeout = Duration::from_secs(2);
    let platform = spawn_platform_with(config).await;

    platform
        .server
        .register_service(
            Arc::new(SlowShutdownService(Duration::from_millis(200))),
            "sleepy",
        )
        .unwrap();

    let mut online = platform.bus.listen_stream(lattice_server::SERVER_ONLINE_CHANNEL);

    let started = Instant::now();
    platform.stop_tx.send(()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), platform.task)
        .await
        .expect("shutdown overran its deadline")
        .unwrap();
    let elapsed = started.elapsed();

    // The 200 ms hook ran to completion, well inside the 2 s deadline.
    assert!(elapsed >= Duration::from_millis(200), "stopped after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "stopped after {elapsed:?}");

    let offline = tokio::time::timeout(Duration::from_secs(1), online.recv())
        .await
        .expect("no offline notification")
        .unwrap();
    assert_eq!(offline.payload, Value::Bool(false));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let platform = spawn_platform().await;

    platform.server.stop().await;
    // Second stop is a no-op and must return promptly.
    tokio::time::timeout(Duration::from_secs(1), platform.server.stop())
        .await
        .expect("second stop must be a no-op");
}

#[tokio::test]
async fn availability_tracks_the_lifecycle() {
    let platform = spawn_platform().await;
    assert!(platform.server.availability().http());
    assert!(!platform.server.availability().fabric());

    let server = Arc::clone(&platform.server);
    platform.shut_down().await;
    assert!(!server.availability().http());
}

// ---------------------------------------------------------------------------
// TLS gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tls_customization_is_rejected_while_running() {
    let platform = spawn_platform().await;

    let tls = Arc::new(
        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(rustls::server::ResolvesServerCertUsingSni::new())),
    );

    let err = platform.server.customize_tls_config(tls).unwrap_err();
    assert!(matches!(err, ServerError::AlreadyRunning));

    platform.shut_down().await;
}
