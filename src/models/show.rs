use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Movie;

/// A scheduled screening. `total_seats` is the capacity the booking engine
/// enforces; seats are numbered `1..=total_seats`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    pub movie_id: i64,
    pub screen_name: String,
    pub start_time: DateTime<Utc>,
    pub total_seats: i32,
}

impl Show {
    pub fn seat_in_range(&self, seat_number: i64) -> bool {
        (1..=i64::from(self.total_seats)).contains(&seat_number)
    }
}

// Show with its movie nested, the shape listings and booking views return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowDetails {
    pub id: i64,
    pub movie: Movie,
    pub screen_name: String,
    pub start_time: DateTime<Utc>,
    pub total_seats: i32,
}

impl ShowDetails {
    pub fn new(show: Show, movie: Movie) -> Self {
        Self {
            id: show.id,
            movie,
            screen_name: show.screen_name,
            start_time: show.start_time,
            total_seats: show.total_seats,
        }
    }
}
