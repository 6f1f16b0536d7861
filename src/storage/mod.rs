//! Storage seams for the catalog and the booking ledger.
//!
//! The booking engine only talks to these traits. A reservation runs inside a
//! [`ShowLock`]: a transaction that holds the exclusive per-show lock until it
//! is committed or dropped. Dropping a lock without calling
//! [`ShowLock::commit`] rolls back everything staged through it.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Booking, Movie, Show};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Read-only movie/show catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_show(&self, show_id: i64) -> Result<Option<Show>>;

    async fn get_movie(&self, movie_id: i64) -> Result<Option<Movie>>;

    async fn list_movies(&self, limit: i64, offset: i64) -> Result<Vec<Movie>>;

    async fn shows_for_movie(&self, movie_id: i64, limit: i64, offset: i64) -> Result<Vec<Show>>;
}

#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Opens a transaction and blocks until the exclusive lock for `show_id`
    /// is held. `None` when the show does not exist.
    async fn lock_show(&self, show_id: i64) -> Result<Option<Box<dyn ShowLock>>>;

    async fn find_booking(&self, booking_id: i64) -> Result<Option<Booking>>;

    /// Conditional single-row transition `booked -> cancelled`. Returns the
    /// updated booking, or `None` if the row was not in `booked` state.
    async fn cancel_booking(&self, booking_id: i64) -> Result<Option<Booking>>;

    /// All bookings of a user, newest first.
    async fn bookings_for_user(&self, user_id: i64) -> Result<Vec<Booking>>;
}

/// Transaction scoped to one show, holding that show's exclusive lock.
#[async_trait]
pub trait ShowLock: Send {
    /// Capacity as read under the lock.
    fn total_seats(&self) -> i32;

    async fn active_booking(&mut self, seat_number: i32) -> Result<Option<Booking>>;

    async fn active_count(&mut self) -> Result<i64>;

    async fn insert_booking(&mut self, user_id: i64, seat_number: i32) -> Result<Booking>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
