//! REST↔Bus bridging.
//!
//! A bridge makes a service channel reachable over HTTP: the registry binds
//! endpoint routes to channels, a per-channel message bridge fans responses
//! back in, and the generated handler runs one request/response cycle per
//! HTTP request, correlated by message id.

pub(crate) mod handler;
pub(crate) mod message_bridge;
pub(crate) mod registry;

use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use lattice_bus::Message;

/// The buffered HTTP request handed to a [`RequestBuilder`].
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Caller-supplied mapping from an HTTP request to a bus request.
///
/// The builder must return a request-direction [`Message`] with a fresh
/// correlation id and the target channel populated — the bridge handler
/// trusts both. [`Message::request`] does the right thing.
pub type RequestBuilder = dyn Fn(&BridgeRequest) -> Message + Send + Sync;

/// Configuration for one REST bridge.
#[derive(Clone)]
pub struct BridgeConfig {
    /// The bus channel the endpoint is bridged to.
    pub service_channel: String,

    /// Path (exact bridges) or prefix (prefix bridges).
    pub uri: String,

    /// HTTP method for exact bridges; ignored by prefix bridges, which
    /// accept every method.
    pub method: Method,

    /// Also permit `HEAD` on the endpoint.
    pub allow_head: bool,

    /// Also permit `OPTIONS` on the endpoint.
    pub allow_options: bool,

    pub request_builder: Arc<RequestBuilder>,
}

impl BridgeConfig {
    pub fn new(
        service_channel: impl Into<String>,
        uri: impl Into<String>,
        method: Method,
        request_builder: impl Fn(&BridgeRequest) -> Message + Send + Sync + 'static,
    ) -> Self {
        Self {
            service_channel: service_channel.into(),
            uri: uri.into(),
            method,
            allow_head: false,
            allow_options: false,
            request_builder: Arc::new(request_builder),
        }
    }
}
