use std::sync::atomic::{AtomicBool, Ordering};

use super::*;
use crate::db::{DbError, MemoryEventStore, MemoryUserStore, NewUser};
use crate::notifier::{BroadcastHub, ChangeNotifier};
use async_trait::async_trait;
use checkin_model::{MAX_DOOR_KEEPERS_PER_ENTRY, MAX_ENTRIES_PER_EVENT};
use rstest::rstest;

struct Harness {
    engine: MutationEngine,
    users: Arc<MemoryUserStore>,
}

fn harness() -> Harness {
    let users = Arc::new(MemoryUserStore::new());
    let engine = MutationEngine::new(
        Arc::new(MemoryEventStore::new()),
        users.clone(),
        NotifierHandle::new(),
    );
    Harness { engine, users }
}

fn admin() -> Subject {
    Subject {
        id: UserId::new(),
        email: "admin@example.com".to_string(),
        role: Role::Admin,
    }
}

fn keeper(id: UserId, email: &str) -> Subject {
    Subject {
        id,
        email: email.to_string(),
        role: Role::Keeper,
    }
}

fn gala(entries: u32) -> NewEvent {
    NewEvent {
        title: "Gala".to_string(),
        venue: "Main Hall".to_string(),
        max_participants: 100,
        alert_point: 90,
        number_of_entries: entries,
    }
}

async fn create(engine: &MutationEngine, entries: u32) -> Event {
    engine
        .create_event(gala(entries))
        .await
        .unwrap()
        .pop()
        .unwrap()
}

#[tokio::test]
async fn test_gala_scenario() {
    let h = harness();
    let events = h.engine.create_event(gala(2)).await.unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.status, EventStatus::Scheduled);
    assert_eq!(event.entries[0].name, "Entry #1");
    assert_eq!(event.entries[1].name, "Entry #2");

    let entry_id = event.entries[0].id;
    let entry = h
        .engine
        .increment_in(&admin(), event.id, entry_id)
        .await
        .unwrap();
    assert_eq!(entry.total_in, 1);

    h.engine
        .set_entry_status(entry_id, EntryStatus::Close)
        .await
        .unwrap();
    let err = h
        .engine
        .increment_in(&admin(), event.id, entry_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "entry_closed");

    let stored = h.engine.list_events().await.unwrap();
    assert_eq!(stored[0].entries[0].total_in, 1);
}

#[tokio::test]
async fn test_increment_out_ignores_entry_status() {
    let h = harness();
    let event = create(&h.engine, 1).await;
    let entry_id = event.entries[0].id;
    h.engine
        .set_entry_status(entry_id, EntryStatus::Close)
        .await
        .unwrap();

    let entry = h
        .engine
        .increment_out(&admin(), event.id, entry_id)
        .await
        .unwrap();
    assert_eq!(entry.total_out, 1);
}

#[tokio::test]
async fn test_increment_unknown_targets() {
    let h = harness();
    let event = create(&h.engine, 1).await;

    let err = h
        .engine
        .increment_in(&admin(), EventId::new(), event.entries[0].id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "event_not_found");

    let err = h
        .engine
        .increment_out(&admin(), event.id, EntryId::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "entry_not_found");
}

#[tokio::test]
async fn test_update_event_resizes_and_keeps_omitted_fields() {
    let h = harness();
    let event = create(&h.engine, 2).await;
    let original = event.entries.clone();

    let events = h
        .engine
        .update_event(
            event.id,
            EventPatch {
                venue: Some("Annex".to_string()),
                number_of_entries: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let updated = &events[0];
    assert_eq!(updated.title, "Gala");
    assert_eq!(updated.venue, "Annex");
    assert_eq!(&updated.entries[..2], &original[..]);
    assert_eq!(updated.entries[3].name, "Entry #4");
    assert!(updated.updated_at >= event.updated_at);

    let events = h
        .engine
        .update_event(
            event.id,
            EventPatch {
                number_of_entries: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(events[0].entries, vec![original[0].clone()]);
}

#[tokio::test]
async fn test_update_missing_event() {
    let h = harness();
    let err = h
        .engine
        .update_event(EventId::new(), EventPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_event_twice() {
    let h = harness();
    let event = create(&h.engine, 1).await;
    assert_eq!(h.engine.delete_event(event.id).await.unwrap(), event.id);
    let err = h.engine.delete_event(event.id).await.unwrap_err();
    assert_eq!(err.code(), "event_not_found");
    assert!(h.engine.list_events().await.unwrap().is_empty());
}

#[rstest]
#[case(EventStatus::Ongoing, true)]
#[case(EventStatus::Cancelled, true)]
#[case(EventStatus::Scheduled, true)]
#[case(EventStatus::Completed, false)]
#[tokio::test]
async fn test_set_event_status_from_scheduled(#[case] next: EventStatus, #[case] ok: bool) {
    let h = harness();
    let event = create(&h.engine, 0).await;
    let result = h.engine.set_event_status(event.id, next).await;
    match result {
        Ok(event) => {
            assert!(ok);
            assert_eq!(event.status, next);
        }
        Err(err) => {
            assert!(!ok);
            assert_eq!(err.code(), "invalid_status_transition");
        }
    }
}

#[tokio::test]
async fn test_assign_keeper_synthesizes_identity() {
    let h = harness();
    let event = create(&h.engine, 2).await;

    let event = h
        .engine
        .assign_or_update_keeper(event.id, " A@X.com ", None)
        .await
        .unwrap();
    let keeper = &event.entries[0].door_keepers[0];
    assert_eq!(keeper.email, "a@x.com");
    assert_eq!(keeper.name, "Keeper 1");

    let event = h
        .engine
        .assign_or_update_keeper(event.id, "b@x.com", None)
        .await
        .unwrap();
    assert_eq!(event.entries[0].door_keepers[1].name, "Keeper 2");
}

#[tokio::test]
async fn test_assign_keeper_reuses_registered_user() {
    let h = harness();
    let user = h
        .users
        .insert(NewUser {
            name: "Ana".to_string(),
            email: "ana@x.com".to_string(),
            password_hash: "digest".to_string(),
            role: Role::Keeper,
        })
        .await
        .unwrap();
    let event = create(&h.engine, 1).await;

    let event = h
        .engine
        .assign_or_update_keeper(event.id, "ana@x.com", None)
        .await
        .unwrap();
    let keeper = &event.entries[0].door_keepers[0];
    assert_eq!(keeper.id, user.id);
    assert_eq!(keeper.name, "Ana");
}

#[tokio::test]
async fn test_assign_same_email_twice_is_conflict() {
    let h = harness();
    let event = create(&h.engine, 2).await;
    let first = h
        .engine
        .assign_or_update_keeper(event.id, "a@x.com", None)
        .await
        .unwrap();

    let err = h
        .engine
        .assign_or_update_keeper(event.id, "a@x.com", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { code: "keeper_email_taken", .. }));

    let stored = h.engine.list_events().await.unwrap();
    assert_eq!(stored[0], first);
}

#[tokio::test]
async fn test_assign_fills_entries_then_runs_out() {
    let h = harness();
    let event = create(&h.engine, 2).await;
    let capacity = 2 * MAX_DOOR_KEEPERS_PER_ENTRY;

    let mut last = event.clone();
    for n in 0..capacity {
        last = h
            .engine
            .assign_or_update_keeper(event.id, &format!("k{n}@x.com"), None)
            .await
            .unwrap();
    }
    assert!(last
        .entries
        .iter()
        .all(|e| e.door_keepers.len() == MAX_DOOR_KEEPERS_PER_ENTRY));

    let err = h
        .engine
        .assign_or_update_keeper(event.id, "late@x.com", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "no_entry_capacity");
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("not-an-email")]
#[tokio::test]
async fn test_assign_requires_email(#[case] email: &str) {
    let h = harness();
    let event = create(&h.engine, 1).await;
    let err = h
        .engine
        .assign_or_update_keeper(event.id, email, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_email");
}

#[tokio::test]
async fn test_update_keeper_email() {
    let h = harness();
    let event = create(&h.engine, 1).await;
    h.engine
        .assign_or_update_keeper(event.id, "a@x.com", None)
        .await
        .unwrap();
    let event = h
        .engine
        .assign_or_update_keeper(event.id, "b@x.com", None)
        .await
        .unwrap();
    let a = event.entries[0].door_keepers[0].id;

    let event = h
        .engine
        .assign_or_update_keeper(event.id, "c@x.com", Some(a))
        .await
        .unwrap();
    assert_eq!(event.entries[0].door_keepers[0].email, "c@x.com");

    let err = h
        .engine
        .assign_or_update_keeper(event.id, "b@x.com", Some(a))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "keeper_email_taken");

    let err = h
        .engine
        .assign_or_update_keeper(event.id, "d@x.com", Some(UserId::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "keeper_not_found");
}

#[tokio::test]
async fn test_remove_keeper_twice() {
    let h = harness();
    let event = create(&h.engine, 1).await;
    let event = h
        .engine
        .assign_or_update_keeper(event.id, "a@x.com", None)
        .await
        .unwrap();
    let entry_id = event.entries[0].id;
    let keeper_id = event.entries[0].door_keepers[0].id;

    let event = h.engine.remove_keeper(entry_id, keeper_id).await.unwrap();
    assert!(event.entries[0].door_keepers.is_empty());

    let err = h
        .engine
        .remove_keeper(entry_id, keeper_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "keeper_not_found");
    let err = h
        .engine
        .remove_keeper(EntryId::new(), keeper_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "entry_not_found");
}

#[tokio::test]
async fn test_remove_entry_twice() {
    let h = harness();
    let event = create(&h.engine, 2).await;
    let entry_id = event.entries[0].id;

    let event = h.engine.remove_entry(entry_id).await.unwrap();
    assert_eq!(event.entries.len(), 1);
    assert_eq!(event.entries[0].name, "Entry #2");

    let err = h.engine.remove_entry(entry_id).await.unwrap_err();
    assert_eq!(err.code(), "entry_not_found");
}

#[tokio::test]
async fn test_keeper_scoping() {
    let h = harness();
    let staffed = create(&h.engine, 1).await;
    let other = create(&h.engine, 1).await;
    let staffed = h
        .engine
        .assign_or_update_keeper(staffed.id, "k@x.com", None)
        .await
        .unwrap();
    let keeper_id = staffed.entries[0].door_keepers[0].id;
    let me = keeper(keeper_id, "k@x.com");

    h.engine
        .increment_in(&me, staffed.id, staffed.entries[0].id)
        .await
        .unwrap();
    let err = h
        .engine
        .increment_in(&me, other.id, other.entries[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    // Matched by email when the keeper id was synthesized before registration.
    let registered = keeper(UserId::new(), "k@x.com");
    h.engine
        .increment_out(&registered, staffed.id, staffed.entries[0].id)
        .await
        .unwrap();

    let mine = h.engine.events_for_keeper(&me, keeper_id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, staffed.id);

    let err = h
        .engine
        .events_for_keeper(&me, UserId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    let none = h
        .engine
        .events_for_keeper(&admin(), UserId::new())
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_concurrent_increments_are_not_lost() {
    let h = Arc::new(harness());
    let event = create(&h.engine, 1).await;
    let entry_id = event.entries[0].id;

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move {
                h.engine
                    .increment_in(&admin(), event.id, entry_id)
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let stored = h.engine.list_events().await.unwrap();
    assert_eq!(stored[0].entries[0].total_in, 20);
}

#[tokio::test]
async fn test_create_event_rejects_too_many_entries() {
    let h = harness();
    let err = h
        .engine
        .create_event(gala(MAX_ENTRIES_PER_EVENT + 1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_field");
    assert!(h.engine.list_events().await.unwrap().is_empty());

    let event = create(&h.engine, 1).await;
    let err = h
        .engine
        .update_event(
            event.id,
            EventPatch {
                number_of_entries: Some(u32::MAX),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_field");
    assert_eq!(h.engine.list_events().await.unwrap()[0].entries.len(), 1);
}

/// Memory store whose `load_all` can be switched off.
#[derive(Default)]
struct FlakyCollection {
    inner: MemoryEventStore,
    fail_load_all: AtomicBool,
}

#[async_trait]
impl EventStore for FlakyCollection {
    async fn load(&self, event_id: &EventId) -> Result<Option<Event>, DbError> {
        self.inner.load(event_id).await
    }

    async fn load_all(&self) -> Result<Vec<Event>, DbError> {
        if self.fail_load_all.load(Ordering::SeqCst) {
            return Err(DbError::Query(sqlx::Error::PoolTimedOut));
        }
        self.inner.load_all().await
    }

    async fn find_by_entry(&self, entry_id: &EntryId) -> Result<Option<Event>, DbError> {
        self.inner.find_by_entry(entry_id).await
    }

    async fn find_by_keeper(&self, keeper_id: &UserId) -> Result<Vec<Event>, DbError> {
        self.inner.find_by_keeper(keeper_id).await
    }

    async fn save(&self, event: &Event) -> Result<(), DbError> {
        self.inner.save(event).await
    }

    async fn delete(&self, event_id: &EventId) -> Result<bool, DbError> {
        self.inner.delete(event_id).await
    }

    async fn health_check(&self) -> Result<(), DbError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_broadcast_does_not_undo_mutation() {
    let store = Arc::new(FlakyCollection::default());
    let hub = BroadcastHub::new(8);
    let mut live = hub.subscribe();
    let notifier = ChangeNotifier::new(store.clone(), Arc::new(hub));
    let engine = MutationEngine::new(
        store.clone(),
        Arc::new(MemoryUserStore::new()),
        notifier.handle(),
    );

    let event = create(&engine, 1).await;
    let entry_id = event.entries[0].id;
    store.fail_load_all.store(true, Ordering::SeqCst);

    let entry = engine
        .increment_in(&admin(), event.id, entry_id)
        .await
        .unwrap();
    assert_eq!(entry.total_in, 1);

    // The snapshot reload fails, so nothing goes out.
    notifier.publish().await;
    assert!(live.try_recv().is_err());

    let stored = store.load(&event.id).await.unwrap().unwrap();
    assert_eq!(stored.entries[0].total_in, 1);

    store.fail_load_all.store(false, Ordering::SeqCst);
    notifier.publish().await;
    let message = live.try_recv().unwrap();
    assert_eq!(message.data["events"][0]["entries"][0]["totalIn"], 1);
}

#[tokio::test]
async fn test_create_event_is_kept_when_reload_fails() {
    let store = Arc::new(FlakyCollection::default());
    let engine = MutationEngine::new(
        store.clone(),
        Arc::new(MemoryUserStore::new()),
        NotifierHandle::new(),
    );
    store.fail_load_all.store(true, Ordering::SeqCst);

    let err = engine.create_event(gala(2)).await.unwrap_err();
    assert!(matches!(err, EngineError::Internal(_)));

    store.fail_load_all.store(false, Ordering::SeqCst);
    let stored = engine.list_events().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].entries.len(), 2);
}
