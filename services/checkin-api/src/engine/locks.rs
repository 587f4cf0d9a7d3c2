//! Per-event critical sections.
//!
//! Every read-modify-write of an event aggregate runs while holding the
//! event's mutex, so two writers to the same event are serialized and writers
//! to different events never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use checkin_id::EventId;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct AggregateLocks {
    locks: Mutex<HashMap<EventId, Arc<AsyncMutex<()>>>>,
}

impl AggregateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `event_id`. Released when the guard drops.
    pub async fn lock(&self, event_id: EventId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock();
            // Idle entries are referenced only by the map.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(event_id).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Number of events with a holder or waiter.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|m| Arc::strong_count(m) > 1)
            .count()
    }
}
