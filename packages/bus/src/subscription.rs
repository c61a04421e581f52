//! Direction-filtered subscription handles.

use tokio::sync::broadcast;
use tracing::warn;

use crate::bus::BusError;
use crate::message::{Message, MessageDirection};

/// Which directions a subscription observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirectionFilter {
    /// Request traffic only (service side).
    Requests,
    /// Response and error traffic (caller side).
    Responses,
}

impl DirectionFilter {
    fn accepts(self, direction: MessageDirection) -> bool {
        match self {
            DirectionFilter::Requests => direction == MessageDirection::Request,
            DirectionFilter::Responses => {
                matches!(direction, MessageDirection::Response | MessageDirection::Error)
            }
        }
    }
}

/// A live subscription to one channel.
///
/// The bus is multi-consumer and never applies backpressure to publishers:
/// if a subscriber falls too far behind, the oldest messages are dropped and
/// a warning is logged, and receiving continues from the oldest retained
/// message.
pub struct Subscription {
    channel: String,
    rx: broadcast::Receiver<Message>,
    filter: DirectionFilter,
}

impl Subscription {
    pub(crate) fn new(
        channel: String,
        rx: broadcast::Receiver<Message>,
        filter: DirectionFilter,
    ) -> Self {
        Self { channel, rx, filter }
    }

    /// A subscription observing request traffic on `channel`. For use by
    /// [`EventBus`](crate::EventBus) implementations outside this crate.
    pub fn requests(channel: impl Into<String>, rx: broadcast::Receiver<Message>) -> Self {
        Self::new(channel.into(), rx, DirectionFilter::Requests)
    }

    /// A subscription observing response and error traffic on `channel`.
    pub fn responses(channel: impl Into<String>, rx: broadcast::Receiver<Message>) -> Self {
        Self::new(channel.into(), rx, DirectionFilter::Responses)
    }

    /// The channel this subscription reads from.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message matching this subscription's direction
    /// filter. Returns [`BusError::ChannelClosed`] once the channel's last
    /// sender is gone.
    pub async fn recv(&mut self) -> Result<Message, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if self.filter.accepts(msg.direction) => return Ok(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        channel = %self.channel,
                        skipped,
                        "subscription lagged, dropping oldest messages"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BusError::ChannelClosed(self.channel.clone()));
                }
            }
        }
    }
}
