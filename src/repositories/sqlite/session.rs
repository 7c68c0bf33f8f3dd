// src/repositories/sqlite/session.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use crate::error::constraint_err;
use crate::models::{NewSession, Session};
use crate::Error;

/// Result of a claim attempt. Losing the race to another worker is an
/// expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Conflict,
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Insert a session row (`pending`, zero attempts) and bump the owning
    /// user's `total_sessions` in the same transaction. An unknown `user_id`
    /// fails with `ConstraintViolation`.
    async fn create(&self, session: &NewSession, now: DateTime<Utc>) -> Result<Session, Error>;

    async fn get(&self, id: &str) -> Result<Option<Session>, Error>;

    /// Snapshot of claimable sessions: `pending` with fewer than
    /// `max_attempts` attempts, oldest `created_at` first, at most `limit`
    /// rows. Listing is not claiming.
    async fn get_pending_sessions(
        &self,
        max_attempts: i64,
        limit: i64,
    ) -> Result<Vec<Session>, Error>;

    /// Atomically transition `pending` to `in_progress`, increment
    /// `analysis_attempts`, and stamp `last_analysis_at`, all in one
    /// conditional statement. Zero rows affected means another worker won
    /// (or the session left `pending`), reported as `Conflict`.
    async fn claim_for_analysis(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, Error>;

    /// Mark analysis completed and clear any error message. Idempotent.
    async fn complete_analysis(&self, id: &str) -> Result<(), Error>;

    /// Mark analysis failed and record the message.
    async fn fail_analysis(&self, id: &str, message: &str) -> Result<(), Error>;

    /// Mark analysis failed and force `analysis_attempts` up to
    /// `max_attempts` so the session can never re-enter a poll batch.
    async fn fail_analysis_terminal(
        &self,
        id: &str,
        message: &str,
        max_attempts: i64,
    ) -> Result<(), Error>;

    /// Requeue `in_progress` sessions whose claim is older than `cutoff`
    /// back to `pending`, leaving `analysis_attempts` untouched. Returns the
    /// number of sessions recovered.
    async fn sweep_stale_claims(&self, cutoff: DateTime<Utc>) -> Result<u64, Error>;
}

#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSessionRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, started_at, ended_at, duration_sec, booking_made, \
     analysis_status, analysis_version, report_ref, audio_ref, analysis_attempts, \
     last_analysis_at, error_message, created_at";

fn row_to_session(row: &SqliteRow) -> Result<Session, Error> {
    let status: String = row.try_get("analysis_status")?;
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        duration_sec: row.try_get("duration_sec")?,
        booking_made: row.try_get("booking_made")?,
        analysis_status: status.parse()?,
        analysis_version: row.try_get("analysis_version")?,
        report_ref: row.try_get("report_ref")?,
        audio_ref: row.try_get("audio_ref")?,
        analysis_attempts: row.try_get("analysis_attempts")?,
        last_analysis_at: row.try_get("last_analysis_at")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SessionRepo for SqliteSessionRepository {
    async fn create(&self, session: &NewSession, now: DateTime<Utc>) -> Result<Session, Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sessions (
                id, user_id, started_at, ended_at, duration_sec, booking_made,
                analysis_version, report_ref, audio_ref, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.duration_sec)
        .bind(session.booking_made)
        .bind(session.analysis_version)
        .bind(&session.report_ref)
        .bind(&session.audio_ref)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(constraint_err)?;

        sqlx::query("UPDATE users SET total_sessions = total_sessions + 1 WHERE id = ?")
            .bind(&session.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        row_to_session(&row)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, Error> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_session(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_pending_sessions(
        &self,
        max_attempts: i64,
        limit: i64,
    ) -> Result<Vec<Session>, Error> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE analysis_status = 'pending' AND analysis_attempts < ?
            ORDER BY created_at ASC
            LIMIT ?
            "#
        ))
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(row_to_session(&row)?);
        }
        Ok(sessions)
    }

    async fn claim_for_analysis(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, Error> {
        // The status guard, attempt increment, and timestamp must stay in one
        // statement; splitting them breaks the claim protocol.
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET analysis_status = 'in_progress',
                analysis_attempts = analysis_attempts + 1,
                last_analysis_at = ?
            WHERE id = ? AND analysis_status = 'pending'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::Conflict)
        }
    }

    async fn complete_analysis(&self, id: &str) -> Result<(), Error> {
        let result = sqlx::query(
            "UPDATE sessions SET analysis_status = 'completed', error_message = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    async fn fail_analysis(&self, id: &str, message: &str) -> Result<(), Error> {
        let result = sqlx::query(
            "UPDATE sessions SET analysis_status = 'failed', error_message = ? WHERE id = ?",
        )
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    async fn fail_analysis_terminal(
        &self,
        id: &str,
        message: &str,
        max_attempts: i64,
    ) -> Result<(), Error> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET analysis_status = 'failed',
                error_message = ?,
                analysis_attempts = MAX(analysis_attempts, ?)
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(max_attempts)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    async fn sweep_stale_claims(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET analysis_status = 'pending'
            WHERE analysis_status = 'in_progress' AND last_analysis_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
