//! Storage layer.
//!
//! This module provides:
//! - Connection pool management and migrations
//! - The event document store (`EventStore`): whole-aggregate load/save plus
//!   nested lookups by entry and door-keeper id
//! - The user account store (`UserStore`)
//!
//! Postgres (via SQLx) is the production backend. The in-memory backend keeps
//! the same contracts and serves tests and `CHECKIN_STORE=memory`.

mod error;
mod event_store;
mod memory;
mod users;

pub use error::DbError;
pub use event_store::{EventStore, PgEventStore};
pub use memory::{MemoryEventStore, MemoryUserStore};
pub use users::{NewUser, PgUserStore, User, UserStore};

use std::path::PathBuf;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Migrations shipped with the service.
pub const BUNDLED_MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations");

/// Postgres connection settings. Built by [`crate::config::Config::from_env`].
///
/// Writes to one event are serialized in-process, so the pool only needs to
/// cover concurrent requests across different events plus readers.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Kept warm so the first request after idle does not pay for a handshake.
    pub min_connections: u32,
    /// How long a request waits for a pooled connection before failing with 500.
    pub acquire_timeout: Duration,
    /// Where `run_migrations` reads `*.sql` files from.
    pub migrations_dir: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost:5432/checkin".to_string(),
            max_connections: 8,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(3),
            migrations_dir: PathBuf::from(BUNDLED_MIGRATIONS_DIR),
        }
    }
}

/// Handle to the Postgres pool backing both document stores.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        info!(
            max_connections = config.max_connections,
            "Connected to event database"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the `events` and `users` schema from `dir`. Dev-mode only;
    /// production applies migrations out of band.
    pub async fn run_migrations_from(&self, dir: &std::path::Path) -> Result<(), DbError> {
        let migrator = load_migrator(dir).await?;
        migrator.run(&self.pool).await.map_err(DbError::Migration)?;
        info!(
            migrations_dir = %dir.display(),
            applied = migrator.iter().count(),
            "Event database schema is current"
        );
        Ok(())
    }

    /// [`Self::run_migrations_from`] the bundled directory.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        self.run_migrations_from(std::path::Path::new(BUNDLED_MIGRATIONS_DIR))
            .await
    }

    pub fn event_store(&self) -> PgEventStore {
        PgEventStore::new(self.pool.clone())
    }

    pub fn user_store(&self) -> PgUserStore {
        PgUserStore::new(self.pool.clone())
    }
}

async fn load_migrator(dir: &std::path::Path) -> Result<Migrator, DbError> {
    Migrator::new(dir.to_path_buf())
        .await
        .map_err(DbError::Migration)
}
