// src/repositories/sqlite/booking.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::error::constraint_err;
use crate::models::{Booking, NewBooking};
use crate::Error;

#[async_trait]
pub trait BookingRepo: Send + Sync {
    /// Insert a booking row (status defaults to `scheduled`) and, in the same
    /// transaction, bump the user's `total_bookings` and latch the profile's
    /// `booked_before`. The profile update is a no-op when no profile row
    /// exists yet.
    async fn insert(&self, booking: &NewBooking, now: DateTime<Utc>) -> Result<Booking, Error>;

    /// Bookings for a session, most recently scheduled first.
    async fn get_by_session(&self, session_id: &str) -> Result<Vec<Booking>, Error>;

    /// Bookings for a user, most recently scheduled first.
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<Booking>, Error>;
}

#[derive(Clone)]
pub struct SqliteBookingRepository {
    pool: Pool<Sqlite>,
}

impl SqliteBookingRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepo for SqliteBookingRepository {
    async fn insert(&self, booking: &NewBooking, now: DateTime<Utc>) -> Result<Booking, Error> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (id, session_id, user_id, scheduled_time, timezone, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, session_id, user_id, scheduled_time, timezone, status, created_at
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.session_id)
        .bind(&booking.user_id)
        .bind(booking.scheduled_time)
        .bind(&booking.timezone)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(constraint_err)?;

        sqlx::query("UPDATE users SET total_bookings = total_bookings + 1 WHERE id = ?")
            .bind(&booking.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE user_profiles SET booked_before = 1 WHERE user_id = ?")
            .bind(&booking.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(inserted)
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Vec<Booking>, Error> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, session_id, user_id, scheduled_time, timezone, status, created_at
            FROM bookings
            WHERE session_id = ?
            ORDER BY scheduled_time DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    async fn get_by_user(&self, user_id: &str) -> Result<Vec<Booking>, Error> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, session_id, user_id, scheduled_time, timezone, status, created_at
            FROM bookings
            WHERE user_id = ?
            ORDER BY scheduled_time DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }
}
