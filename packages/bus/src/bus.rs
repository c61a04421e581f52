//! The [`EventBus`] contract.
//!
//! The bus is deliberately small: publish in one of three directions,
//! subscribe to one of two direction filters, and reach the shared stores.
//! Everything else (correlation, bridging, lifecycle) is built on top by
//! consumers.

use async_trait::async_trait;

use crate::message::Message;
use crate::store::StoreManager;
use crate::subscription::Subscription;

/// Errors surfaced by bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The channel's underlying stream was torn down while a subscription
    /// was still reading from it (the bus was dropped or the channel closed).
    #[error("channel {0} is closed")]
    ChannelClosed(String),
}

/// The in-process event bus.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared as
/// an `Arc<dyn EventBus>`. Channels are identified by name and spring into
/// existence on first use; publishing to a channel nobody listens on is a
/// silent no-op.
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    /// Publish a request-direction message on `msg.channel`.
    async fn send_request(&self, msg: Message) -> Result<(), BusError>;

    /// Publish a response-direction message on `msg.channel`.
    async fn send_response(&self, msg: Message) -> Result<(), BusError>;

    /// Publish an error-direction message on `msg.channel`.
    async fn send_error(&self, msg: Message) -> Result<(), BusError>;

    /// Subscribe to response and error traffic on a channel.
    fn listen_stream(&self, channel: &str) -> Subscription;

    /// Subscribe to request traffic on a channel. This is what services use
    /// to receive work.
    fn listen_request_stream(&self, channel: &str) -> Subscription;

    /// Shared named stores (service readiness and the like).
    fn stores(&self) -> &StoreManager;
}
