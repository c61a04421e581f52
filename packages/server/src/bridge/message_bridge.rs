//! Per-channel message bridge.
//!
//! One bus subscription per bridged channel, regardless of how many
//! endpoints or in-flight HTTP requests share it. Incoming messages pass
//! through a bounded queue (capacity 100, drop-newest — the bus is
//! multi-consumer, so the bridge must never apply backpressure to it) and a
//! dispatch task completes the per-correlation-id slot of whichever handler
//! is waiting. A message nobody waits for is discarded.
//!
//! The bridge outlives individual HTTP handlers and survives re-bridging of
//! its channel; it is torn down only at server shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lattice_bus::{EventBus, Message, MessageDirection};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed bound on undispatched messages per channel. Overflow implies a slow
/// dispatch loop; new messages are dropped with a warning.
pub(crate) const BRIDGE_QUEUE_CAPACITY: usize = 100;

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Message>>>>;

/// A registered wait for one correlated response.
///
/// Dropping the slot (timeout, client disconnect) abandons the wait; a late
/// message for its id is then discarded by the dispatch task.
pub(crate) struct ResponseSlot {
    id: Uuid,
    rx: oneshot::Receiver<Message>,
    pending: PendingMap,
}

impl ResponseSlot {
    /// Wait for the correlated message. Errors when the bridge was torn
    /// down or a channel-level failure voided the slot's sender.
    pub(crate) async fn recv(&mut self) -> Result<Message, SlotClosed> {
        (&mut self.rx).await.map_err(|_| SlotClosed)
    }
}

impl Drop for ResponseSlot {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.remove(&self.id);
    }
}

/// The bridge (or the whole channel) went away while a handler was waiting.
#[derive(Debug)]
pub(crate) struct SlotClosed;

/// One bus subscription fanning a channel's responses into correlation slots.
pub(crate) struct MessageBridge {
    channel: String,
    pending: PendingMap,
    pump: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl MessageBridge {
    /// Subscribe to `channel` and start the pump and dispatch tasks.
    pub(crate) fn open(bus: &Arc<dyn EventBus>, channel: &str) -> Arc<Self> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (queue_tx, queue_rx) = mpsc::channel::<Message>(BRIDGE_QUEUE_CAPACITY);

        let mut subscription = bus.listen_stream(channel);
        let pump_channel = channel.to_string();
        let pump = tokio::spawn(async move {
            while let Ok(msg) = subscription.recv().await {
                if let Err(mpsc::error::TrySendError::Full(_)) = queue_tx.try_send(msg) {
                    warn!(
                        channel = %pump_channel,
                        capacity = BRIDGE_QUEUE_CAPACITY,
                        "bridge queue full, dropping incoming message"
                    );
                }
            }
        });

        let dispatch = tokio::spawn(dispatch_loop(
            queue_rx,
            Arc::clone(&pending),
            channel.to_string(),
        ));

        Arc::new(Self {
            channel: channel.to_string(),
            pending,
            pump,
            dispatch,
        })
    }

    /// Register a wait for the message correlated to `id`. Must happen
    /// before the request is published so the response cannot race the
    /// registration.
    pub(crate) fn register(&self, id: Uuid) -> ResponseSlot {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.insert(id, tx);
        }
        ResponseSlot {
            id,
            rx,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Cancel the subscription tasks and void every pending slot. Waiting
    /// handlers observe [`SlotClosed`].
    pub(crate) fn shutdown(&self) {
        self.pump.abort();
        self.dispatch.abort();
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.clear();
        debug!(channel = %self.channel, "message bridge torn down");
    }
}

async fn dispatch_loop(mut queue_rx: mpsc::Receiver<Message>, pending: PendingMap, channel: String) {
    while let Some(msg) = queue_rx.recv().await {
        let mut pending = pending.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(tx) = pending.remove(&msg.id) {
            // A send failure means the waiter gave up; the message is stale.
            let _ = tx.send(msg);
        } else if msg.direction == MessageDirection::Error {
            // A failure nobody correlates with poisons the whole channel:
            // every in-flight request gets the error.
            for (_, tx) in pending.drain() {
                let _ = tx.send(msg.clone());
            }
        } else {
            debug!(
                channel = %channel,
                correlation_id = %msg.id,
                "discarding message with no matching waiter"
            );
        }
    }
}
