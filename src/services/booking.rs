//! booking.rs
//!
//! The booking engine: reserve and cancel single seats without ever
//! double-booking a seat or selling more seats than a show has.
//!
//! Reserve runs in two phases:
//! 1.  **Validation** without any lock: the seat number must parse, the show
//!     must exist and the seat must be within `1..=total_seats`.
//! 2.  **Critical section** under the show's exclusive lock: re-check the
//!     seat, re-check the active count against capacity, insert, commit.
//!     Reservations for different shows never wait on each other.
//!
//! Cancel is a conditional single-row update and takes no show lock; it can
//! only shrink the active set.

use serde_json::Value;
use std::num::IntErrorKind;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::models::{Booking, BookingStatus};
use crate::storage::{BookingLedger, CatalogStore};

/// Parses a raw `seat_number` request value. Accepts JSON integers, integral
/// floats (`3.0`) and strings holding an integer; missing, `null`,
/// fractional or other values are rejected. Integers too large for `i64`
/// saturate so that the range check reports them as out of range.
pub fn parse_seat_number(raw: Option<&Value>) -> Result<i64> {
    let raw = raw
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::InvalidInput("seat_number is required".to_string()))?;

    let parsed = match raw {
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Some(i),
            (None, Some(_), _) => Some(i64::MAX),
            // `as` saturates at the i64 bounds
            (None, None, Some(f)) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
            _ => None,
        },
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => Some(i),
            Err(e) => match e.kind() {
                IntErrorKind::PosOverflow => Some(i64::MAX),
                IntErrorKind::NegOverflow => Some(i64::MIN),
                _ => None,
            },
        },
        _ => None,
    };
    parsed.ok_or_else(|| Error::InvalidInput("seat_number must be an integer".to_string()))
}

#[derive(Clone)]
pub struct BookingEngine {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn BookingLedger>,
}

impl BookingEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, ledger: Arc<dyn BookingLedger>) -> Self {
        Self { catalog, ledger }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    /// Reserve from a raw request value, see [`parse_seat_number`].
    pub async fn reserve(&self, user_id: i64, show_id: i64, seat_number: Option<&Value>) -> Result<Booking> {
        let seat_number = parse_seat_number(seat_number)?;
        self.reserve_seat(user_id, show_id, seat_number).await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn reserve_seat(&self, user_id: i64, show_id: i64, seat_number: i64) -> Result<Booking> {
        let show = self
            .catalog
            .get_show(show_id)
            .await?
            .ok_or(Error::NotFound("show"))?;

        if !show.seat_in_range(seat_number) {
            return Err(Error::OutOfRange { seat_number, total_seats: show.total_seats });
        }
        let seat = i32::try_from(seat_number)
            .map_err(|_| Error::OutOfRange { seat_number, total_seats: show.total_seats })?;

        // Everything below runs under the show lock; returning early drops
        // the lock and rolls the transaction back.
        let mut lock = self
            .ledger
            .lock_show(show_id)
            .await?
            .ok_or(Error::NotFound("show"))?;

        let total_seats = lock.total_seats();
        if seat > total_seats {
            return Err(Error::OutOfRange { seat_number, total_seats });
        }

        if let Some(existing) = lock.active_booking(seat).await? {
            warn!("seat {} of show {} already held by booking {}", seat, show_id, existing.id);
            return Err(Error::SeatTaken { show_id, seat_number: seat });
        }

        let active = lock.active_count().await?;
        if active >= i64::from(total_seats) {
            warn!("show {} is full ({}/{})", show_id, active, total_seats);
            return Err(Error::ShowFull { show_id });
        }

        let booking = lock.insert_booking(user_id, seat).await?;
        lock.commit().await?;

        info!(
            "booking {} committed: user {} show {} seat {}",
            booking.id, user_id, show_id, seat
        );
        Ok(booking)
    }

    /// Cancels a booking owned by `user_id`. Cancelling twice is an error.
    #[instrument(skip(self), level = "debug")]
    pub async fn cancel(&self, user_id: i64, booking_id: i64) -> Result<Booking> {
        let booking = self
            .ledger
            .find_booking(booking_id)
            .await?
            .ok_or(Error::NotFound("booking"))?;

        if booking.user_id != user_id {
            warn!("user {} tried to cancel booking {} of user {}", user_id, booking_id, booking.user_id);
            return Err(Error::Forbidden);
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(Error::AlreadyCancelled { booking_id });
        }

        // A concurrent cancel may have won since the read above.
        match self.ledger.cancel_booking(booking_id).await? {
            Some(cancelled) => {
                info!(
                    "booking {} cancelled, seat {} of show {} released",
                    booking_id, cancelled.seat_number, cancelled.show_id
                );
                Ok(cancelled)
            }
            None => Err(Error::AlreadyCancelled { booking_id }),
        }
    }

    pub async fn list_user_bookings(&self, user_id: i64) -> Result<Vec<Booking>> {
        self.ledger.bookings_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use serde_json::json;

    async fn engine_with_show(total_seats: i32) -> (BookingEngine, MemoryStore, i64) {
        let store = MemoryStore::new();
        let movie = store.add_movie("Test Movie", 90).await.unwrap();
        let show = store.add_show(movie.id, "Screen 1", Utc::now(), total_seats).await.unwrap();
        let engine = BookingEngine::new(Arc::new(store.clone()), Arc::new(store.clone()));
        (engine, store, show.id)
    }

    #[test]
    fn seat_number_parsing() {
        assert_eq!(parse_seat_number(Some(&json!(7))).unwrap(), 7);
        assert_eq!(parse_seat_number(Some(&json!("12"))).unwrap(), 12);
        assert_eq!(parse_seat_number(Some(&json!(" 3 "))).unwrap(), 3);
        assert_eq!(parse_seat_number(Some(&json!(-2))).unwrap(), -2);

        assert_eq!(parse_seat_number(Some(&json!(3.0))).unwrap(), 3);
        assert_eq!(parse_seat_number(Some(&json!("99999999999999999999"))).unwrap(), i64::MAX);
        assert_eq!(parse_seat_number(Some(&json!(u64::MAX))).unwrap(), i64::MAX);
        assert_eq!(parse_seat_number(Some(&json!("-99999999999999999999"))).unwrap(), i64::MIN);

        for bad in [json!(null), json!("abc"), json!(2.5), json!("3.0"), json!(true), json!([1])] {
            assert!(matches!(parse_seat_number(Some(&bad)), Err(Error::InvalidInput(_))), "{bad}");
        }
        assert!(matches!(parse_seat_number(None), Err(Error::InvalidInput(msg)) if msg.contains("required")));
    }

    #[tokio::test]
    async fn invalid_input_is_reported_before_show_lookup() {
        let (engine, _, _) = engine_with_show(5).await;
        let err = engine.reserve(1, 999, Some(&json!("x"))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn oversized_seat_numbers_are_out_of_range() {
        let (engine, _, show_id) = engine_with_show(5).await;
        for raw in [json!("99999999999999999999"), json!(u64::MAX), json!(1e300)] {
            let err = engine.reserve(1, show_id, Some(&raw)).await.unwrap_err();
            assert!(matches!(err, Error::OutOfRange { total_seats: 5, .. }), "{raw}");
        }

        let booking = engine.reserve(1, show_id, Some(&json!(3.0))).await.unwrap();
        assert_eq!(booking.seat_number, 3);
    }

    #[tokio::test]
    async fn unknown_show_is_not_found() {
        let (engine, _, _) = engine_with_show(5).await;
        let err = engine.reserve_seat(1, 999, 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound("show")));
    }

    #[tokio::test]
    async fn range_is_checked_against_capacity() {
        let (engine, _, show_id) = engine_with_show(50).await;

        for seat in [0, 51, -1, i64::from(i32::MAX) + 1] {
            let err = engine.reserve_seat(1, show_id, seat).await.unwrap_err();
            assert!(matches!(err, Error::OutOfRange { total_seats: 50, .. }), "seat {seat}");
        }

        let booking = engine.reserve_seat(1, show_id, 50).await.unwrap();
        assert_eq!(booking.seat_number, 50);
        assert_eq!(booking.status, BookingStatus::Booked);
    }

    #[tokio::test]
    async fn taken_seat_is_rejected() {
        let (engine, _, show_id) = engine_with_show(5).await;
        engine.reserve_seat(1, show_id, 3).await.unwrap();

        let err = engine.reserve_seat(2, show_id, 3).await.unwrap_err();
        assert!(matches!(err, Error::SeatTaken { seat_number: 3, .. }));
    }

    #[tokio::test]
    async fn reduced_capacity_reports_show_full_for_a_free_seat() {
        let (engine, store, show_id) = engine_with_show(3).await;
        engine.reserve_seat(1, show_id, 2).await.unwrap();
        engine.reserve_seat(2, show_id, 3).await.unwrap();

        store.set_total_seats(show_id, 2).await.unwrap();

        let err = engine.reserve_seat(3, show_id, 1).await.unwrap_err();
        assert!(matches!(err, Error::ShowFull { .. }));
        assert_eq!(engine.list_user_bookings(3).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn cancel_state_machine() {
        let (engine, _, show_id) = engine_with_show(5).await;
        let booking = engine.reserve_seat(1, show_id, 1).await.unwrap();

        assert!(matches!(engine.cancel(1, 12345).await, Err(Error::NotFound("booking"))));
        assert!(matches!(engine.cancel(2, booking.id).await, Err(Error::Forbidden)));

        let cancelled = engine.cancel(1, booking.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let again = engine.cancel(1, booking.id).await.unwrap_err();
        assert!(matches!(again, Error::AlreadyCancelled { booking_id } if booking_id == booking.id));
    }

    #[tokio::test]
    async fn user_bookings_keep_history() {
        let (engine, _, show_id) = engine_with_show(5).await;
        let first = engine.reserve_seat(1, show_id, 1).await.unwrap();
        engine.cancel(1, first.id).await.unwrap();
        let second = engine.reserve_seat(1, show_id, 1).await.unwrap();

        let bookings = engine.list_user_bookings(1).await.unwrap();
        assert_eq!(bookings.len(), 2);
        assert_eq!(bookings[0].id, second.id);
        assert_eq!(bookings[1].status, BookingStatus::Cancelled);
    }
}
