//! Mutation engine.
//!
//! Every state-changing operation on events, entries and door-keepers goes
//! through [`MutationEngine`]. Each one:
//! 1. Resolves the owning event (directly, or by an entry id)
//! 2. Takes the event's lock and loads the aggregate in full
//! 3. Applies the change in memory via `checkin-model`
//! 4. Saves the whole aggregate and signals the change notifier
//!
//! Role checks happen at the HTTP boundary. The engine only enforces keeper
//! scoping, which depends on the loaded aggregate.

mod error;
mod locks;

pub use error::EngineError;
pub use locks::AggregateLocks;

use std::sync::Arc;

use checkin_id::{EntryId, EventId, UserId};
use checkin_model::{
    DoorKeeper, Entry, EntryStatus, Event, EventPatch, EventStatus, NewEvent, Role,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::Subject;
use crate::db::{EventStore, UserStore};
use crate::notifier::NotifierHandle;
use error::storage;

pub type EngineResult<T> = Result<T, EngineError>;

/// Lowercased, trimmed email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct MutationEngine {
    events: Arc<dyn EventStore>,
    users: Arc<dyn UserStore>,
    notifier: NotifierHandle,
    locks: AggregateLocks,
}

impl MutationEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        users: Arc<dyn UserStore>,
        notifier: NotifierHandle,
    ) -> Self {
        Self {
            events,
            users,
            notifier,
            locks: AggregateLocks::new(),
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Create a scheduled event and return the refreshed collection.
    ///
    /// The event is committed before the collection is reloaded. If only the
    /// reload fails the caller still gets an error, but the event exists.
    pub async fn create_event(&self, new: NewEvent) -> EngineResult<Vec<Event>> {
        let event = Event::create(new)?;
        self.events
            .save(&event)
            .await
            .map_err(storage("save event"))?;
        self.notifier.notify();

        info!(
            event_id = %event.id,
            entries = event.entries.len(),
            "Event created"
        );
        self.reload_after_commit(event.id).await
    }

    /// Apply a partial update and return the refreshed collection. Like
    /// [`Self::create_event`], a failed reload does not undo the update.
    pub async fn update_event(
        &self,
        event_id: EventId,
        patch: EventPatch,
    ) -> EngineResult<Vec<Event>> {
        self.mutate(event_id, |event| Ok(event.apply_patch(patch)?))
            .await?;
        info!(event_id = %event_id, "Event updated");
        self.reload_after_commit(event_id).await
    }

    pub async fn set_event_status(
        &self,
        event_id: EventId,
        status: EventStatus,
    ) -> EngineResult<Event> {
        let (event, changed) = self
            .mutate(event_id, |event| Ok(event.transition_to(status)?))
            .await?;
        if changed {
            info!(event_id = %event_id, status = %status, "Event status changed");
        }
        Ok(event)
    }

    pub async fn delete_event(&self, event_id: EventId) -> EngineResult<EventId> {
        let _guard = self.locks.lock(event_id).await;
        let deleted = self
            .events
            .delete(&event_id)
            .await
            .map_err(storage("delete event"))?;
        if !deleted {
            return Err(EngineError::event_not_found(&event_id));
        }
        self.notifier.notify();

        info!(event_id = %event_id, "Event deleted");
        Ok(event_id)
    }

    /// Every event in storage order.
    pub async fn list_events(&self) -> EngineResult<Vec<Event>> {
        self.events.load_all().await.map_err(storage("load events"))
    }

    async fn reload_after_commit(&self, event_id: EventId) -> EngineResult<Vec<Event>> {
        self.list_events().await.inspect_err(|_| {
            warn!(
                event_id = %event_id,
                "Event was saved but the collection could not be reloaded"
            );
        })
    }

    // =========================================================================
    // Door-keepers
    // =========================================================================

    /// Assign `email` as a new door-keeper, or, with `keeper_id`, change the
    /// email of an existing one.
    ///
    /// A new keeper reuses the identity and name of the user registered under
    /// the email, if any; otherwise it gets a fresh id and the name
    /// `Keeper <n+1>`. It is posted to the first entry with room.
    pub async fn assign_or_update_keeper(
        &self,
        event_id: EventId,
        email: &str,
        keeper_id: Option<UserId>,
    ) -> EngineResult<Event> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(EngineError::bad_request(
                "invalid_email",
                "A valid email is required",
            ));
        }

        if let Some(keeper_id) = keeper_id {
            let (event, ()) = self
                .mutate(event_id, |event| {
                    Ok(event.update_keeper_email(&keeper_id, email.clone())?)
                })
                .await?;
            info!(event_id = %event_id, keeper_id = %keeper_id, "Door-keeper email updated");
            return Ok(event);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(storage("look up user"))?;

        let (event, entry_id) = self
            .mutate(event_id, |event| {
                let keeper = match &user {
                    Some(user) => DoorKeeper {
                        id: user.id,
                        name: user.name.clone(),
                        email: email.clone(),
                    },
                    None => DoorKeeper {
                        id: UserId::new(),
                        name: event.next_keeper_name(),
                        email: email.clone(),
                    },
                };
                Ok(event.assign_keeper(keeper)?)
            })
            .await?;

        info!(
            event_id = %event_id,
            entry_id = %entry_id,
            registered = user.is_some(),
            "Door-keeper assigned"
        );
        Ok(event)
    }

    pub async fn remove_keeper(
        &self,
        entry_id: EntryId,
        keeper_id: UserId,
    ) -> EngineResult<Event> {
        let (event, removed) = self
            .mutate_by_entry(entry_id, |event| {
                Ok(event.remove_keeper(&entry_id, &keeper_id)?)
            })
            .await?;
        info!(
            event_id = %event.id,
            entry_id = %entry_id,
            keeper_id = %removed.id,
            "Door-keeper removed"
        );
        Ok(event)
    }

    // =========================================================================
    // Entries
    // =========================================================================

    pub async fn remove_entry(&self, entry_id: EntryId) -> EngineResult<Event> {
        let (event, _) = self
            .mutate_by_entry(entry_id, |event| Ok(event.remove_entry(&entry_id)?))
            .await?;
        info!(event_id = %event.id, entry_id = %entry_id, "Entry removed");
        Ok(event)
    }

    pub async fn set_entry_status(
        &self,
        entry_id: EntryId,
        status: EntryStatus,
    ) -> EngineResult<Event> {
        let (event, ()) = self
            .mutate_by_entry(entry_id, |event| {
                Ok(event.set_entry_status(&entry_id, status)?)
            })
            .await?;
        info!(event_id = %event.id, entry_id = %entry_id, status = %status, "Entry status set");
        Ok(event)
    }

    /// Admit one guest through an open entry.
    pub async fn increment_in(
        &self,
        actor: &Subject,
        event_id: EventId,
        entry_id: EntryId,
    ) -> EngineResult<Entry> {
        let (event, entry) = self
            .mutate(event_id, |event| {
                ensure_staffed(actor, event)?;
                Ok(event.record_in(&entry_id)?.clone())
            })
            .await?;

        if event.alert_point_reached() {
            warn!(
                event_id = %event_id,
                alert_point = event.alert_point,
                occupancy = event.occupancy(),
                "Event reached its alert point"
            );
        }
        Ok(entry)
    }

    /// Record one guest leaving. Counted regardless of entry status.
    pub async fn increment_out(
        &self,
        actor: &Subject,
        event_id: EventId,
        entry_id: EntryId,
    ) -> EngineResult<Entry> {
        let (_, entry) = self
            .mutate(event_id, |event| {
                ensure_staffed(actor, event)?;
                Ok(event.record_out(&entry_id)?.clone())
            })
            .await?;
        Ok(entry)
    }

    /// Events where `keeper_id` staffs at least one entry. Keepers may only
    /// ask about themselves.
    pub async fn events_for_keeper(
        &self,
        actor: &Subject,
        keeper_id: UserId,
    ) -> EngineResult<Vec<Event>> {
        if actor.role == Role::Keeper && actor.id != keeper_id {
            return Err(EngineError::forbidden(
                "Keepers can only list their own events",
            ));
        }
        self.events
            .find_by_keeper(&keeper_id)
            .await
            .map_err(storage("load keeper events"))
    }

    // =========================================================================
    // Read-modify-write
    // =========================================================================

    /// Lock, load, apply `f`, save, notify. Nothing is written when `f` fails.
    async fn mutate<T, F>(&self, event_id: EventId, f: F) -> EngineResult<(Event, T)>
    where
        F: FnOnce(&mut Event) -> EngineResult<T>,
    {
        let _guard = self.locks.lock(event_id).await;

        let mut event = self
            .events
            .load(&event_id)
            .await
            .map_err(storage("load event"))?
            .ok_or_else(|| EngineError::event_not_found(&event_id))?;

        let out = f(&mut event)?;
        event.updated_at = Utc::now();

        self.events
            .save(&event)
            .await
            .map_err(storage("save event"))?;
        self.notifier.notify();

        Ok((event, out))
    }

    /// [`Self::mutate`] on the event that owns `entry_id`. The entry is
    /// looked up again under the lock in case it moved or vanished.
    async fn mutate_by_entry<T, F>(&self, entry_id: EntryId, f: F) -> EngineResult<(Event, T)>
    where
        F: FnOnce(&mut Event) -> EngineResult<T>,
    {
        let owner = self
            .events
            .find_by_entry(&entry_id)
            .await
            .map_err(storage("find entry"))?
            .ok_or_else(|| EngineError::entry_not_found(&entry_id))?;

        self.mutate(owner.id, |event| {
            if event.entry(&entry_id).is_none() {
                return Err(EngineError::entry_not_found(&entry_id));
            }
            f(event)
        })
        .await
        .map_err(|e| match e {
            EngineError::NotFound { code: "event_not_found", .. } => {
                EngineError::entry_not_found(&entry_id)
            }
            other => other,
        })
    }
}

/// Keepers may only operate events they staff, matched by id or email.
fn ensure_staffed(actor: &Subject, event: &Event) -> EngineResult<()> {
    if actor.role == Role::Keeper && !event.has_keeper(&actor.id, Some(&actor.email)) {
        return Err(EngineError::forbidden(
            "Keepers can only operate entries of events they staff",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
