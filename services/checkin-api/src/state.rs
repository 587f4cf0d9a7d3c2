//! Application state shared across request handlers.

use std::sync::Arc;

use chrono::Duration;

use crate::auth::{CredentialService, PasswordHasher};
use crate::db::{EventStore, UserStore};
use crate::engine::MutationEngine;
use crate::notifier::{BroadcastHub, NotifierHandle};

/// Credential services and token policy.
pub struct AuthSettings {
    pub credentials: Arc<dyn CredentialService>,
    pub passwords: Arc<dyn PasswordHasher>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Registering with this email yields an admin account.
    pub admin_email: String,
}

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: MutationEngine,
    events: Arc<dyn EventStore>,
    users: Arc<dyn UserStore>,
    hub: BroadcastHub,
    auth: AuthSettings,
}

impl AppState {
    /// Wire the engine to `events`/`users`; committed changes signal `notifier`.
    pub fn new(
        events: Arc<dyn EventStore>,
        users: Arc<dyn UserStore>,
        hub: BroadcastHub,
        notifier: NotifierHandle,
        auth: AuthSettings,
    ) -> Self {
        let engine = MutationEngine::new(events.clone(), users.clone(), notifier);
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                events,
                users,
                hub,
                auth,
            }),
        }
    }

    pub fn engine(&self) -> &MutationEngine {
        &self.inner.engine
    }

    pub fn event_store(&self) -> &dyn EventStore {
        self.inner.events.as_ref()
    }

    pub fn user_store(&self) -> &dyn UserStore {
        self.inner.users.as_ref()
    }

    /// Live transport for WebSocket subscribers.
    pub fn hub(&self) -> &BroadcastHub {
        &self.inner.hub
    }

    pub fn credentials(&self) -> &dyn CredentialService {
        self.inner.auth.credentials.as_ref()
    }

    pub fn passwords(&self) -> &dyn PasswordHasher {
        self.inner.auth.passwords.as_ref()
    }

    pub fn auth(&self) -> &AuthSettings {
        &self.inner.auth
    }
}
