// src/repositories/sqlite/user.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::error::constraint_err;
use crate::models::User;
use crate::Error;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user keyed by `visitor_id`, or merge into the existing row on
    /// conflict. Incoming nulls never overwrite non-null fields;
    /// `last_seen_at` is refreshed either way. Returns the stored row, whose
    /// id may differ from `id` when the visitor already existed.
    async fn upsert_by_visitor_id(
        &self,
        id: &str,
        visitor_id: &str,
        email: Option<&str>,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, Error>;

    /// Same merge semantics as `upsert_by_visitor_id`, keyed by `email`.
    async fn upsert_by_email(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, Error>;

    async fn get(&self, id: &str) -> Result<Option<User>, Error>;
    async fn get_by_visitor_id(&self, visitor_id: &str) -> Result<Option<User>, Error>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    /// Atomic counter bump; exactly-once per causal event is the caller's
    /// responsibility.
    async fn increment_session_count(&self, id: &str) -> Result<(), Error>;
    async fn increment_booking_count(&self, id: &str) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, visitor_id, email, name, created_at, last_seen_at, total_sessions, total_bookings";

#[async_trait]
impl UserRepo for SqliteUserRepository {
    async fn upsert_by_visitor_id(
        &self,
        id: &str,
        visitor_id: &str,
        email: Option<&str>,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, visitor_id, email, name, created_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(visitor_id) DO UPDATE SET
                email = COALESCE(excluded.email, users.email),
                name = COALESCE(excluded.name, users.name),
                last_seen_at = excluded.last_seen_at
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(visitor_id)
        .bind(email)
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_err)?;

        Ok(user)
    }

    async fn upsert_by_email(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, created_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                name = COALESCE(excluded.name, users.name),
                last_seen_at = excluded.last_seen_at
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_err)?;

        Ok(user)
    }

    async fn get(&self, id: &str) -> Result<Option<User>, Error> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    async fn get_by_visitor_id(&self, visitor_id: &str) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE visitor_id = ?"
        ))
        .bind(visitor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn increment_session_count(&self, id: &str) -> Result<(), Error> {
        let result =
            sqlx::query("UPDATE users SET total_sessions = total_sessions + 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn increment_booking_count(&self, id: &str) -> Result<(), Error> {
        let result =
            sqlx::query("UPDATE users SET total_bookings = total_bookings + 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("user {}", id)));
        }
        Ok(())
    }
}
