//! Lattice platform server.
//!
//! Co-hosts an HTTP(S) endpoint surface and a STOMP broker seam on top of
//! the [`lattice_bus`] event bus, and keeps a live, mutable binding between
//! bus service channels and REST routes: a client can invoke a service
//! either by publishing on its channel or by calling an HTTP endpoint the
//! server translates into a correlated bus request/response cycle.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::http::Method;
//! use lattice_bus::{EventBus, MemoryBus, Message};
//! use lattice_server::{BridgeConfig, PlatformConfig, PlatformServer};
//!
//! # async fn run() {
//! let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
//! let server = PlatformServer::new(PlatformConfig::default(), Arc::clone(&bus), None);
//!
//! // Make GET /echo?q=... invoke whatever service listens on "echo".
//! server.set_http_channel_bridge(BridgeConfig::new(
//!     "echo",
//!     "/echo",
//!     Method::GET,
//!     |req| Message::request("echo", serde_json::json!(req.uri.query())),
//! ));
//!
//! let (_stop, signal) = tokio::sync::mpsc::channel(1);
//! server.start(signal).await;
//! # }
//! ```

pub mod bridge;
pub mod config;
mod dispatch;
pub mod error;
pub mod fabric;
mod http;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod service;
pub mod static_files;

pub use bridge::{BridgeConfig, BridgeRequest, RequestBuilder};
pub use config::{FabricConfig, PlatformConfig, TlsCertConfig};
pub use error::ServerError;
pub use fabric::{FabricBinding, FabricEndpoint};
pub use routes::{HandlerMiddleware, RouteEntry, RouteHandler, RouteKind};
pub use server::{PlatformServer, ServerAvailability, SERVER_ONLINE_CHANNEL};
pub use service::{FabricService, ServiceRegistry};
