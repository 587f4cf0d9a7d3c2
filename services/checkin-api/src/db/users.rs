//! User account storage.

use async_trait::async_trait;
use checkin_id::UserId;
use checkin_model::Role;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};

use super::DbError;

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewUser {
    pub(crate) fn into_user(self) -> User {
        User {
            id: UserId::new(),
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<User>, DbError>;

    /// Create an account. Fails with [`DbError::Duplicate`] if the email is taken.
    async fn insert(&self, user: NewUser) -> Result<User, DbError>;

    async fn admin_exists(&self) -> Result<bool, DbError>;
}

/// Postgres-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, name, email, password_hash, role, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(|r| r.0))
    }

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, name, email, password_hash, role, created_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(|r| r.0))
    }

    async fn insert(&self, user: NewUser) -> Result<User, DbError> {
        let user = user.into_user();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                DbError::Duplicate(format!("user with email {}", user.email))
            } else {
                DbError::Query(e)
            }
        })?;

        Ok(user)
    }

    async fn admin_exists(&self) -> Result<bool, DbError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)
    }
}

/// Row from the users table.
struct UserRow(User);

impl<'r> sqlx::FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let user_id: String = row.try_get("user_id")?;
        let role: String = row.try_get("role")?;

        let id = UserId::parse(&user_id).map_err(|e| sqlx::Error::ColumnDecode {
            index: "user_id".to_string(),
            source: Box::new(e),
        })?;
        let role = Role::parse(&role).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: format!("unknown role '{role}'").into(),
        })?;

        Ok(Self(User {
            id,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role,
            created_at: row.try_get("created_at")?,
        }))
    }
}
