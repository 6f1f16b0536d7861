//! In-process catalog and booking ledger.
//!
//! Per-show exclusivity comes from one `tokio::sync::Mutex` per show. Inserts
//! made under that lock are staged and only land in the shared booking table
//! on commit, where the active-seat uniqueness constraint is checked again
//! under the table's write lock, the same way the partial unique index backs
//! up the application check in Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use super::{BookingLedger, CatalogStore, ShowLock};
use crate::error::{Error, Result};
use crate::models::{Booking, BookingStatus, Movie, Show};

type BookingTable = Arc<RwLock<BTreeMap<i64, Booking>>>;

#[derive(Default)]
struct Catalog {
    movies: BTreeMap<i64, Movie>,
    shows: BTreeMap<i64, Show>,
}

#[derive(Default)]
struct Inner {
    catalog: RwLock<Catalog>,
    bookings: BookingTable,
    show_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    catalog_ids: AtomicI64,
    booking_ids: Arc<AtomicI64>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a couple of movies and shows, for running the
    /// server without a database.
    pub async fn with_demo_catalog() -> Result<Self> {
        let store = Self::new();
        let tomorrow = Utc::now() + Duration::days(1);

        let first = store.add_movie("The Long Queue", 118).await?;
        store.add_show(first.id, "Screen 1", tomorrow, 50).await?;
        store.add_show(first.id, "Screen 2", tomorrow + Duration::hours(3), 30).await?;

        let second = store.add_movie("Last Seat Standing", 96).await?;
        store.add_show(second.id, "Screen 1", tomorrow + Duration::hours(6), 1).await?;

        Ok(store)
    }

    pub async fn add_movie(&self, title: impl Into<String>, duration_minutes: i32) -> Result<Movie> {
        if duration_minutes <= 0 {
            return Err(Error::InvalidInput("duration_minutes must be positive".to_string()));
        }
        let movie = Movie {
            id: self.next_catalog_id(),
            title: title.into(),
            duration_minutes,
        };
        self.inner.catalog.write().await.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    pub async fn add_show(
        &self,
        movie_id: i64,
        screen_name: impl Into<String>,
        start_time: DateTime<Utc>,
        total_seats: i32,
    ) -> Result<Show> {
        if total_seats <= 0 {
            return Err(Error::InvalidInput("total_seats must be positive".to_string()));
        }
        let mut catalog = self.inner.catalog.write().await;
        if !catalog.movies.contains_key(&movie_id) {
            return Err(Error::NotFound("movie"));
        }
        let show = Show {
            id: self.next_catalog_id(),
            movie_id,
            screen_name: screen_name.into(),
            start_time,
            total_seats,
        };
        catalog.shows.insert(show.id, show.clone());
        Ok(show)
    }

    /// Changes a show's capacity. Waits for the show lock so the change never
    /// lands in the middle of a reservation.
    pub async fn set_total_seats(&self, show_id: i64, total_seats: i32) -> Result<Show> {
        if total_seats <= 0 {
            return Err(Error::InvalidInput("total_seats must be positive".to_string()));
        }
        let lock = self.show_mutex(show_id).await;
        let _guard = lock.lock().await;

        let mut catalog = self.inner.catalog.write().await;
        let show = catalog.shows.get_mut(&show_id).ok_or(Error::NotFound("show"))?;
        show.total_seats = total_seats;
        Ok(show.clone())
    }

    fn next_catalog_id(&self) -> i64 {
        self.inner.catalog_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn show_mutex(&self, show_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.inner.show_locks.lock().await;
        locks.entry(show_id).or_default().clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_show(&self, show_id: i64) -> Result<Option<Show>> {
        Ok(self.inner.catalog.read().await.shows.get(&show_id).cloned())
    }

    async fn get_movie(&self, movie_id: i64) -> Result<Option<Movie>> {
        Ok(self.inner.catalog.read().await.movies.get(&movie_id).cloned())
    }

    async fn list_movies(&self, limit: i64, offset: i64) -> Result<Vec<Movie>> {
        let catalog = self.inner.catalog.read().await;
        Ok(catalog
            .movies
            .values()
            .skip(to_usize(offset))
            .take(to_usize(limit))
            .cloned()
            .collect())
    }

    async fn shows_for_movie(&self, movie_id: i64, limit: i64, offset: i64) -> Result<Vec<Show>> {
        let catalog = self.inner.catalog.read().await;
        let mut shows: Vec<&Show> = catalog.shows.values().filter(|s| s.movie_id == movie_id).collect();
        shows.sort_by_key(|s| (s.start_time, s.id));
        Ok(shows
            .into_iter()
            .skip(to_usize(offset))
            .take(to_usize(limit))
            .cloned()
            .collect())
    }
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[async_trait]
impl BookingLedger for MemoryStore {
    async fn lock_show(&self, show_id: i64) -> Result<Option<Box<dyn ShowLock>>> {
        if !self.inner.catalog.read().await.shows.contains_key(&show_id) {
            return Ok(None);
        }

        let guard = self.show_mutex(show_id).await.lock_owned().await;
        debug!("acquired in-memory lock for show {}", show_id);

        // Capacity is read again now that the lock is held.
        let total_seats = match self.inner.catalog.read().await.shows.get(&show_id) {
            Some(show) => show.total_seats,
            None => return Ok(None),
        };

        Ok(Some(Box::new(MemoryShowLock {
            _guard: guard,
            show_id,
            total_seats,
            bookings: self.inner.bookings.clone(),
            booking_ids: self.inner.booking_ids.clone(),
            staged: Vec::new(),
        })))
    }

    async fn find_booking(&self, booking_id: i64) -> Result<Option<Booking>> {
        Ok(self.inner.bookings.read().await.get(&booking_id).cloned())
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<Option<Booking>> {
        let mut table = self.inner.bookings.write().await;
        match table.get_mut(&booking_id) {
            Some(booking) if booking.status == BookingStatus::Booked => {
                booking.status = BookingStatus::Cancelled;
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn bookings_for_user(&self, user_id: i64) -> Result<Vec<Booking>> {
        let table = self.inner.bookings.read().await;
        let mut bookings: Vec<Booking> = table.values().filter(|b| b.user_id == user_id).cloned().collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }
}

struct MemoryShowLock {
    _guard: OwnedMutexGuard<()>,
    show_id: i64,
    total_seats: i32,
    bookings: BookingTable,
    booking_ids: Arc<AtomicI64>,
    staged: Vec<Booking>,
}

#[async_trait]
impl ShowLock for MemoryShowLock {
    fn total_seats(&self) -> i32 {
        self.total_seats
    }

    async fn active_booking(&mut self, seat_number: i32) -> Result<Option<Booking>> {
        let is_match = |b: &&Booking| b.show_id == self.show_id && b.seat_number == seat_number && b.is_active();
        if let Some(staged) = self.staged.iter().find(is_match) {
            return Ok(Some(staged.clone()));
        }
        let table = self.bookings.read().await;
        Ok(table.values().find(is_match).cloned())
    }

    async fn active_count(&mut self) -> Result<i64> {
        let table = self.bookings.read().await;
        let committed = table
            .values()
            .filter(|b| b.show_id == self.show_id && b.is_active())
            .count();
        Ok((committed + self.staged.len()) as i64)
    }

    async fn insert_booking(&mut self, user_id: i64, seat_number: i32) -> Result<Booking> {
        let booking = Booking {
            id: self.booking_ids.fetch_add(1, Ordering::Relaxed) + 1,
            user_id,
            show_id: self.show_id,
            seat_number,
            status: BookingStatus::Booked,
            created_at: Utc::now(),
        };
        self.staged.push(booking.clone());
        Ok(booking)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let mut table = this.bookings.write().await;

        // Uniqueness over (show, seat) restricted to active rows.
        for (i, new) in this.staged.iter().enumerate() {
            let clashes_committed = table
                .values()
                .any(|b| b.show_id == new.show_id && b.seat_number == new.seat_number && b.is_active());
            let clashes_staged = this.staged[..i].iter().any(|b| b.seat_number == new.seat_number);
            if clashes_committed || clashes_staged {
                return Err(Error::SeatTaken {
                    show_id: new.show_id,
                    seat_number: new.seat_number,
                });
            }
        }

        for booking in this.staged {
            table.insert(booking.id, booking);
        }
        Ok(())
    }
}
