//! Bus message model.
//!
//! Every message carries a correlation id. Requests stamp a fresh one;
//! responses and errors echo the id of the request they answer. Consumers
//! that fan a channel into many waiters match on this id — delivery order
//! between unrelated messages on the same channel is not guaranteed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Which way a message is travelling on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// From a caller towards the service listening on the channel.
    Request,
    /// From the service back to whoever correlates on the id.
    Response,
    /// A failure surfaced on the channel's error path.
    Error,
}

/// A single message on a bus channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id. Fresh for requests, echoed for responses and errors.
    pub id: Uuid,

    /// Name of the channel the message was published on.
    pub channel: String,

    pub direction: MessageDirection,

    /// Application payload. The bus does not interpret it.
    pub payload: Value,

    /// Optional HTTP status a service wants surfaced when this message is
    /// returned through a REST bridge. `None` means "use the default".
    pub status: Option<u16>,

    /// Human-readable failure description; populated on `Error` messages.
    pub error: Option<String>,
}

impl Message {
    /// Build a request with a freshly generated correlation id.
    pub fn request(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            direction: MessageDirection::Request,
            payload,
            status: None,
            error: None,
        }
    }

    /// Build a response answering the request with `correlation_id`.
    pub fn response(channel: impl Into<String>, correlation_id: Uuid, payload: Value) -> Self {
        Self {
            id: correlation_id,
            channel: channel.into(),
            direction: MessageDirection::Response,
            payload,
            status: None,
            error: None,
        }
    }

    /// Build an error answering the request with `correlation_id`.
    pub fn error(
        channel: impl Into<String>,
        correlation_id: Uuid,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: correlation_id,
            channel: channel.into(),
            direction: MessageDirection::Error,
            payload: Value::Null,
            status: None,
            error: Some(description.into()),
        }
    }

    /// Attach an HTTP status to surface across a REST bridge.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}
