//! The generated REST→Bus endpoint handler.
//!
//! One HTTP request becomes one bus request/response cycle: buffer the body,
//! let the caller's builder shape the bus request, register the correlation
//! slot, publish, and wait — bounded by the per-bridge timeout. Outcomes:
//!
//! | Bus outcome | HTTP response |
//! |-------------|---------------|
//! | Correlated response | message status (default 200), JSON payload |
//! | Correlated / channel error | 502 |
//! | No response in time | 504 |
//! | Publish failed | 502 |
//!
//! A builder panic unwinds into the recovery middleware (500) before
//! anything is published. If the client disconnects, the handler future is
//! dropped and the slot guard abandons the wait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lattice_bus::{EventBus, Message, MessageDirection};
use tracing::warn;

use crate::bridge::message_bridge::MessageBridge;
use crate::bridge::{BridgeRequest, RequestBuilder};
use crate::routes::RouteHandler;

pub(crate) struct RestBusHandler {
    channel: String,
    builder: Arc<RequestBuilder>,
    timeout: Duration,
    bridge: Arc<MessageBridge>,
    bus: Arc<dyn EventBus>,
}

impl RestBusHandler {
    pub(crate) fn new(
        channel: impl Into<String>,
        builder: Arc<RequestBuilder>,
        timeout: Duration,
        bridge: Arc<MessageBridge>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            channel: channel.into(),
            builder,
            timeout,
            bridge,
            bus,
        }
    }
}

#[async_trait]
impl RouteHandler for RestBusHandler {
    async fn handle(&self, req: Request) -> Response {
        let (parts, body) = req.into_parts();
        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("failed to read request body: {e}\n"),
                )
                    .into_response();
            }
        };

        let bridge_req = BridgeRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        };

        let bus_request = (self.builder)(&bridge_req);
        let correlation_id = bus_request.id;

        // Register before publishing so a fast response cannot race the slot.
        let mut slot = self.bridge.register(correlation_id);

        if let Err(e) = self.bus.send_request(bus_request).await {
            warn!(channel = %self.channel, error = %e, "failed to publish bridge request");
            return (
                StatusCode::BAD_GATEWAY,
                format!("failed to reach service channel {}\n", self.channel),
            )
                .into_response();
        }

        match tokio::time::timeout(self.timeout, slot.recv()).await {
            Ok(Ok(msg)) if msg.direction == MessageDirection::Error => (
                StatusCode::BAD_GATEWAY,
                format!(
                    "service channel {} reported an error: {}\n",
                    self.channel,
                    msg.error.as_deref().unwrap_or("unknown")
                ),
            )
                .into_response(),

            Ok(Ok(msg)) => {
                let status = msg
                    .status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::OK);
                (status, Json(msg.payload)).into_response()
            }

            Ok(Err(_)) => (
                StatusCode::BAD_GATEWAY,
                format!("bridge for service channel {} was torn down\n", self.channel),
            )
                .into_response(),

            Err(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                format!(
                    "no response from service channel {} within {:?}\n",
                    self.channel, self.timeout
                ),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Method;
    use lattice_bus::MemoryBus;
    use serde_json::{json, Value};

    fn echo_builder() -> Arc<RequestBuilder> {
        Arc::new(|req: &BridgeRequest| {
            Message::request("chan", json!(String::from_utf8_lossy(&req.body)))
        })
    }

    fn handler_with(bus: &Arc<dyn EventBus>, timeout: Duration) -> RestBusHandler {
        let bridge = MessageBridge::open(bus, "chan");
        RestBusHandler::new("chan", echo_builder(), timeout, bridge, Arc::clone(bus))
    }

    fn post(body: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/bridge")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// A service task that answers the next request on `chan`.
    fn spawn_echo_service(bus: Arc<dyn EventBus>) {
        let mut sub = bus.listen_request_stream("chan");
        tokio::spawn(async move {
            if let Ok(msg) = sub.recv().await {
                bus.send_response(Message::response("chan", msg.id, msg.payload))
                    .await
                    .unwrap();
            }
        });
    }

    #[tokio::test]
    async fn round_trip_returns_the_service_payload() {
        let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
        let handler = handler_with(&bus, Duration::from_secs(1));
        spawn_echo_service(Arc::clone(&bus));

        let resp = handler.handle(post("hello")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!("hello"));
    }

    #[tokio::test]
    async fn message_status_overrides_the_default() {
        let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
        let handler = handler_with(&bus, Duration::from_secs(1));

        let mut sub = bus.listen_request_stream("chan");
        let service_bus = Arc::clone(&bus);
        tokio::spawn(async move {
            let msg = sub.recv().await.unwrap();
            service_bus
                .send_response(Message::response("chan", msg.id, json!("made")).with_status(201))
                .await
                .unwrap();
        });

        let resp = handler.handle(post("x")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn no_service_response_times_out_as_504() {
        let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
        let handler = handler_with(&bus, Duration::from_millis(50));

        let started = std::time::Instant::now();
        let resp = handler.handle(post("anyone there?")).await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn correlated_error_becomes_502() {
        let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
        let handler = handler_with(&bus, Duration::from_secs(1));

        let mut sub = bus.listen_request_stream("chan");
        let service_bus = Arc::clone(&bus);
        tokio::spawn(async move {
            let msg = sub.recv().await.unwrap();
            service_bus
                .send_error(Message::error("chan", msg.id, "backend down"))
                .await
                .unwrap();
        });

        let resp = handler.handle(post("x")).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn response_for_another_request_is_not_delivered() {
        let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
        let handler = handler_with(&bus, Duration::from_millis(100));

        let mut sub = bus.listen_request_stream("chan");
        let service_bus = Arc::clone(&bus);
        tokio::spawn(async move {
            let _ = sub.recv().await.unwrap();
            // Respond to a correlation id that belongs to nobody.
            service_bus
                .send_response(Message::response("chan", uuid::Uuid::new_v4(), json!("wrong")))
                .await
                .unwrap();
        });

        let resp = handler.handle(post("x")).await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
