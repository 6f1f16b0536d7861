//! PostgreSQL catalog and booking ledger.
//!
//! A reservation transaction locks the show row (`SELECT ... FOR UPDATE`).
//! Every reservation for the show goes through that row, so the row lock is
//! the per-show lock: it also covers seats that have no booking row yet,
//! which locking the matching booking rows would not. The partial unique
//! index `bookings_active_seat_key` is the storage-level backstop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

use super::{BookingLedger, CatalogStore, ShowLock};
use crate::error::{Error, Result};
use crate::models::{Booking, Movie, Show};

const BOOKING_COLUMNS: &str = "id, user_id, show_id, seat_number, status, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: i64,
    user_id: i64,
    show_id: i64,
    seat_number: i32,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = Error;

    fn try_from(row: BookingRow) -> Result<Self> {
        let status = row
            .status
            .parse()
            .map_err(|e: String| Error::Database(sqlx::Error::Decode(e.into())))?;
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            show_id: row.show_id,
            seat_number: row.seat_number,
            status,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn get_show(&self, show_id: i64) -> Result<Option<Show>> {
        let show = sqlx::query_as::<_, Show>(
            "SELECT id, movie_id, screen_name, start_time, total_seats FROM shows WHERE id = $1",
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(show)
    }

    async fn get_movie(&self, movie_id: i64) -> Result<Option<Movie>> {
        let movie = sqlx::query_as::<_, Movie>("SELECT id, title, duration_minutes FROM movies WHERE id = $1")
            .bind(movie_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(movie)
    }

    async fn list_movies(&self, limit: i64, offset: i64) -> Result<Vec<Movie>> {
        let movies = sqlx::query_as::<_, Movie>(
            "SELECT id, title, duration_minutes FROM movies ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(movies)
    }

    async fn shows_for_movie(&self, movie_id: i64, limit: i64, offset: i64) -> Result<Vec<Show>> {
        let shows = sqlx::query_as::<_, Show>(
            r#"
            SELECT id, movie_id, screen_name, start_time, total_seats
            FROM shows
            WHERE movie_id = $1
            ORDER BY start_time, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(movie_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(shows)
    }
}

#[async_trait]
impl BookingLedger for PgStore {
    async fn lock_show(&self, show_id: i64) -> Result<Option<Box<dyn ShowLock>>> {
        let mut tx = self.pool.begin().await?;

        // Bounded wait; an expired wait comes back as SQLSTATE 55P03 -> Conflict.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        let total_seats: Option<i32> =
            sqlx::query_scalar("SELECT total_seats FROM shows WHERE id = $1 FOR UPDATE")
                .bind(show_id)
                .fetch_optional(&mut *tx)
                .await?;

        match total_seats {
            Some(total_seats) => {
                debug!("acquired row lock for show {}", show_id);
                Ok(Some(Box::new(PgShowLock { tx, show_id, total_seats })))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn find_booking(&self, booking_id: i64) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = 'cancelled' WHERE id = $1 AND status = 'booked' RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn bookings_for_user(&self, user_id: i64) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

struct PgShowLock {
    tx: Transaction<'static, Postgres>,
    show_id: i64,
    total_seats: i32,
}

#[async_trait]
impl ShowLock for PgShowLock {
    fn total_seats(&self) -> i32 {
        self.total_seats
    }

    async fn active_booking(&mut self, seat_number: i32) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE show_id = $1 AND seat_number = $2 AND status = 'booked'",
            BOOKING_COLUMNS
        ))
        .bind(self.show_id)
        .bind(seat_number)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn active_count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE show_id = $1 AND status = 'booked'")
            .bind(self.show_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn insert_booking(&mut self, user_id: i64, seat_number: i32) -> Result<Booking> {
        let show_id = self.show_id;
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "INSERT INTO bookings (user_id, show_id, seat_number, status) VALUES ($1, $2, $3, 'booked') RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .bind(show_id)
        .bind(seat_number)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| Error::from_insert(e, show_id, seat_number))?;
        Booking::try_from(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
