use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ShowDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Booked,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(BookingStatus::Booked),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// One reservation of one seat. Rows are never deleted: a cancelled booking
/// stays as history and the seat can be booked again by a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub show_id: i64,
    pub seat_number: i32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Booked
    }
}

// Response shape: booking with the show (and its movie) nested.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: i64,
    pub show: ShowDetails,
    pub seat_number: i32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl BookingView {
    pub fn new(booking: Booking, show: ShowDetails) -> Self {
        Self {
            id: booking.id,
            show,
            seat_number: booking.seat_number,
            status: booking.status,
            created_at: booking.created_at,
        }
    }
}
