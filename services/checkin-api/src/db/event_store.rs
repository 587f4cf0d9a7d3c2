//! Event document store.
//!
//! Events are persisted whole: every mutation loads the aggregate, changes it in
//! memory and writes the full document back. The store provides:
//! - Load by id, load all (creation order)
//! - Nested lookups: the event owning an entry, events staffed by a keeper
//! - Whole-aggregate upsert and delete

use async_trait::async_trait;
use checkin_id::{EntryId, EventId, UserId};
use checkin_model::Event;
use sqlx::{postgres::PgPool, types::Json};

use super::DbError;

/// Document store for event aggregates.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Load one event.
    async fn load(&self, event_id: &EventId) -> Result<Option<Event>, DbError>;

    /// Load every event in storage (creation) order.
    async fn load_all(&self) -> Result<Vec<Event>, DbError>;

    /// Find the event whose entries contain `entry_id`.
    async fn find_by_entry(&self, entry_id: &EntryId) -> Result<Option<Event>, DbError>;

    /// Find every event with `keeper_id` staffing at least one entry.
    async fn find_by_keeper(&self, keeper_id: &UserId) -> Result<Vec<Event>, DbError>;

    /// Insert or replace the whole aggregate.
    async fn save(&self, event: &Event) -> Result<(), DbError>;

    /// Delete an event. Returns `false` if it did not exist.
    async fn delete(&self, event_id: &EventId) -> Result<bool, DbError>;

    /// Check the backend is reachable.
    async fn health_check(&self) -> Result<(), DbError>;
}

/// Postgres-backed event store. One JSONB document per event.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn load(&self, event_id: &EventId) -> Result<Option<Event>, DbError> {
        let document = sqlx::query_scalar::<_, Json<Event>>(
            r#"
            SELECT document
            FROM events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(document.map(|Json(event)| event))
    }

    async fn load_all(&self) -> Result<Vec<Event>, DbError> {
        let documents = sqlx::query_scalar::<_, Json<Event>>(
            r#"
            SELECT document
            FROM events
            ORDER BY created_at ASC, event_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(documents.into_iter().map(|Json(event)| event).collect())
    }

    async fn find_by_entry(&self, entry_id: &EntryId) -> Result<Option<Event>, DbError> {
        let filter = serde_json::json!([{ "id": entry_id }]);
        let document = sqlx::query_scalar::<_, Json<Event>>(
            r#"
            SELECT document
            FROM events
            WHERE document -> 'entries' @> $1
            LIMIT 1
            "#,
        )
        .bind(Json(filter))
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(document.map(|Json(event)| event))
    }

    async fn find_by_keeper(&self, keeper_id: &UserId) -> Result<Vec<Event>, DbError> {
        let filter = serde_json::json!([{ "doorKeepers": [{ "id": keeper_id }] }]);
        let documents = sqlx::query_scalar::<_, Json<Event>>(
            r#"
            SELECT document
            FROM events
            WHERE document -> 'entries' @> $1
            ORDER BY created_at ASC, event_id ASC
            "#,
        )
        .bind(Json(filter))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(documents.into_iter().map(|Json(event)| event).collect())
    }

    async fn save(&self, event: &Event) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO events (event_id, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO UPDATE
            SET document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event.id.to_string())
        .bind(Json(event))
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    async fn delete(&self, event_id: &EventId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM events WHERE event_id = $1")
            .bind(event_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}
