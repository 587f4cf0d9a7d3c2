//! Change notification.
//!
//! After every committed mutation the engine pokes a [`NotifierHandle`]. The
//! [`ChangeNotifier`] worker wakes up, reloads the whole event collection and
//! broadcasts it over a [`LiveTransport`] on the [`EVENT_UPDATED`] channel.
//!
//! Signals coalesce: a burst of mutations while a broadcast is in flight
//! produces one more broadcast, not one per mutation. The worker always
//! reloads after the last signal it saw, so the final broadcast reflects the
//! latest committed state. Delivery is fire-and-forget; nothing here can fail
//! a mutation.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info, instrument, warn};

use crate::db::{DbError, EventStore};

/// Channel name for full-collection snapshots.
pub const EVENT_UPDATED: &str = "eventUpdated";

/// One message on the live transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveMessage {
    pub event: String,
    pub data: Value,
}

/// Fan-out to every connected live subscriber.
pub trait LiveTransport: Send + Sync {
    /// Deliver `payload` on `channel`. Having no subscribers is not an error.
    fn broadcast(&self, channel: &str, payload: Value);
}

/// In-process live transport over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<LiveMessage>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Messages a subscriber may fall behind by before it starts skipping.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl LiveTransport for BroadcastHub {
    fn broadcast(&self, channel: &str, payload: Value) {
        let message = LiveMessage {
            event: channel.to_string(),
            data: payload,
        };
        match self.tx.send(message) {
            Ok(receivers) => debug!(channel, receivers, "Broadcast live update"),
            Err(_) => debug!(channel, "No live subscribers"),
        }
    }
}

/// The payload broadcast on [`EVENT_UPDATED`]: every event, in storage order.
pub async fn snapshot(store: &dyn EventStore) -> Result<Value, DbError> {
    let events = store.load_all().await?;
    Ok(json!({ "events": events }))
}

/// Cheap handle the engine uses to signal a committed change.
#[derive(Clone, Default)]
pub struct NotifierHandle {
    signal: Arc<Notify>,
}

impl NotifierHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a broadcast. Never blocks; repeated calls before the worker
    /// wakes collapse into one.
    pub fn notify(&self) {
        self.signal.notify_one();
    }
}

/// Background worker that turns change signals into snapshot broadcasts.
pub struct ChangeNotifier {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn LiveTransport>,
    handle: NotifierHandle,
}

impl ChangeNotifier {
    pub fn new(store: Arc<dyn EventStore>, transport: Arc<dyn LiveTransport>) -> Self {
        Self {
            store,
            transport,
            handle: NotifierHandle::new(),
        }
    }

    /// A handle wired to this worker.
    pub fn handle(&self) -> NotifierHandle {
        self.handle.clone()
    }

    /// Run until the shutdown channel flips to `true`.
    #[instrument(skip(self, shutdown), name = "change_notifier")]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting change notifier");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = self.handle.signal.notified() => {
                    self.publish().await;
                }
            }
        }

        info!("Change notifier stopped");
    }

    /// Reload and broadcast once. Load failures are logged and skipped.
    pub async fn publish(&self) {
        match snapshot(self.store.as_ref()).await {
            Ok(payload) => self.transport.broadcast(EVENT_UPDATED, payload),
            Err(e) => warn!(error = %e, "Failed to load events for live update"),
        }
    }
}
