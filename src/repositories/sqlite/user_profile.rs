// src/repositories/sqlite/user_profile.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::error::constraint_err;
use crate::models::UserProfile;
use crate::Error;

#[async_trait]
pub trait UserProfileRepo: Send + Sync {
    /// Insert or merge the profile row for `user_id`. Incoming nulls leave
    /// existing values in place; `booked_before` only latches false to true
    /// (`Some(false)` and `None` both leave it alone); `last_visit_at` is
    /// refreshed on every call.
    async fn upsert(
        &self,
        user_id: &str,
        company: Option<&str>,
        domain: Option<&str>,
        last_intent_type: Option<&str>,
        booked_before: Option<bool>,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, Error>;

    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, Error>;
}

#[derive(Clone)]
pub struct SqliteUserProfileRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserProfileRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserProfileRepo for SqliteUserProfileRepository {
    async fn upsert(
        &self,
        user_id: &str,
        company: Option<&str>,
        domain: Option<&str>,
        last_intent_type: Option<&str>,
        booked_before: Option<bool>,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, Error> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (
                user_id, company, domain, last_intent_type, booked_before,
                last_visit_at, created_at
            )
            VALUES (?, ?, ?, ?, COALESCE(?, 0), ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                company = COALESCE(excluded.company, user_profiles.company),
                domain = COALESCE(excluded.domain, user_profiles.domain),
                last_intent_type = COALESCE(excluded.last_intent_type, user_profiles.last_intent_type),
                booked_before = CASE
                    WHEN excluded.booked_before THEN 1
                    ELSE user_profiles.booked_before
                END,
                last_visit_at = excluded.last_visit_at
            RETURNING user_id, company, domain, last_intent_type, booked_before,
                      last_visit_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(company)
        .bind(domain)
        .bind(last_intent_type)
        .bind(booked_before)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_err)?;

        Ok(profile)
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, Error> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, company, domain, last_intent_type, booked_before,
                   last_visit_at, created_at
            FROM user_profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }
}
