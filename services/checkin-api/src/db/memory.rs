//! In-memory stores.
//!
//! Same contracts as the Postgres stores; state lives for the life of the
//! process. Events keep insertion order so `load_all` matches the Postgres
//! `ORDER BY created_at`.

use async_trait::async_trait;
use checkin_id::{EntryId, EventId, UserId};
use checkin_model::{Event, Role};
use parking_lot::RwLock;

use super::{DbError, EventStore, NewUser, User, UserStore};

#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn load(&self, event_id: &EventId) -> Result<Option<Event>, DbError> {
        Ok(self
            .events
            .read()
            .iter()
            .find(|e| &e.id == event_id)
            .cloned())
    }

    async fn load_all(&self) -> Result<Vec<Event>, DbError> {
        Ok(self.events.read().clone())
    }

    async fn find_by_entry(&self, entry_id: &EntryId) -> Result<Option<Event>, DbError> {
        Ok(self
            .events
            .read()
            .iter()
            .find(|e| e.entry(entry_id).is_some())
            .cloned())
    }

    async fn find_by_keeper(&self, keeper_id: &UserId) -> Result<Vec<Event>, DbError> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.has_keeper(keeper_id, None))
            .cloned()
            .collect())
    }

    async fn save(&self, event: &Event) -> Result<(), DbError> {
        let mut events = self.events.write();
        match events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event.clone(),
            None => events.push(event.clone()),
        }
        Ok(())
    }

    async fn delete(&self, event_id: &EventId) -> Result<bool, DbError> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| &e.id != event_id);
        Ok(events.len() != before)
    }

    async fn health_check(&self) -> Result<(), DbError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        Ok(self.users.read().iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<User>, DbError> {
        Ok(self.users.read().iter().find(|u| &u.id == user_id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, DbError> {
        let mut users = self.users.write();
        if users.iter().any(|u| u.email == user.email) {
            return Err(DbError::Duplicate(format!("user with email {}", user.email)));
        }
        let user = user.into_user();
        users.push(user.clone());
        Ok(user)
    }

    async fn admin_exists(&self) -> Result<bool, DbError> {
        Ok(self.users.read().iter().any(|u| u.role == Role::Admin))
    }
}
