//! In-memory bus implementation.
//!
//! One `tokio::sync::broadcast` channel per bus channel, created on first
//! use by either a publisher or a subscriber. Broadcast gives the bus its
//! delivery semantics for free: every live subscription observes every
//! message published after it was created, and a slow subscriber loses the
//! oldest messages rather than blocking the publisher.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::bus::{BusError, EventBus};
use crate::message::{Message, MessageDirection};
use crate::store::StoreManager;
use crate::subscription::{DirectionFilter, Subscription};

/// How many undelivered messages a single channel retains per subscriber
/// before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 256;

/// Thread-safe, in-process implementation of [`EventBus`].
pub struct MemoryBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Message>>>,
    stores: StoreManager,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            stores: StoreManager::new(),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Message> {
        {
            let channels = self.channels.read().unwrap_or_else(|p| p.into_inner());
            if let Some(tx) = channels.get(channel) {
                return tx.clone();
            }
        }
        let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn publish(&self, msg: Message, direction: MessageDirection) {
        let mut msg = msg;
        msg.direction = direction;
        // A send error just means nobody is subscribed right now.
        let _ = self.sender(&msg.channel).send(msg);
    }

    fn subscribe(&self, channel: &str, filter: DirectionFilter) -> Subscription {
        Subscription::new(channel.to_string(), self.sender(channel).subscribe(), filter)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn send_request(&self, msg: Message) -> Result<(), BusError> {
        self.publish(msg, MessageDirection::Request);
        Ok(())
    }

    async fn send_response(&self, msg: Message) -> Result<(), BusError> {
        self.publish(msg, MessageDirection::Response);
        Ok(())
    }

    async fn send_error(&self, msg: Message) -> Result<(), BusError> {
        self.publish(msg, MessageDirection::Error);
        Ok(())
    }

    fn listen_stream(&self, channel: &str) -> Subscription {
        self.subscribe(channel, DirectionFilter::Responses)
    }

    fn listen_request_stream(&self, channel: &str) -> Subscription {
        self.subscribe(channel, DirectionFilter::Requests)
    }

    fn stores(&self) -> &StoreManager {
        &self.stores
    }
}
