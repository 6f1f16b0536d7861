//! error.rs
//!
//! Error taxonomy shared by the booking engine, both storage backends and the
//! HTTP layer. Contention outcomes (`SeatTaken`, `ShowFull`) are ordinary
//! results, not faults; only `Conflict` is worth retrying as-is.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request data (missing or non-integer seat number, bad paging).
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("seat_number {seat_number} out of range (1..={total_seats})")]
    OutOfRange { seat_number: i64, total_seats: i32 },

    #[error("seat {seat_number} already booked for show {show_id}")]
    SeatTaken { show_id: i64, seat_number: i32 },

    #[error("no seats available for show {show_id}")]
    ShowFull { show_id: i64 },

    #[error("cannot cancel others booking")]
    Forbidden,

    #[error("booking {booking_id} already cancelled")]
    AlreadyCancelled { booking_id: i64 },

    /// Transient storage failure: lock timeout, deadlock, serialization
    /// failure, exhausted pool. The whole operation may be retried.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::NotFound(_) => "not_found",
            Error::OutOfRange { .. } => "out_of_range",
            Error::SeatTaken { .. } => "seat_taken",
            Error::ShowFull { .. } => "show_full",
            Error::Forbidden => "forbidden",
            Error::AlreadyCancelled { .. } => "already_cancelled",
            Error::Conflict(_) => "conflict",
            Error::Database(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_)
            | Error::OutOfRange { .. }
            | Error::SeatTaken { .. }
            | Error::ShowFull { .. }
            | Error::AlreadyCancelled { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// SQLSTATE codes Postgres uses for failures that go away on retry.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";

impl Error {
    /// Maps a failed booking insert. The partial unique index only covers
    /// active bookings, so a unique violation there is a double booking.
    pub fn from_insert(err: sqlx::Error, show_id: i64, seat_number: i32) -> Self {
        let unique = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if unique {
            Error::SeatTaken { show_id, seat_number }
        } else {
            Error::from(err)
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => Error::Conflict("connection pool exhausted".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE | QUERY_CANCELED) => {
                    Error::Conflict(db.message().to_string())
                }
                _ => Error::Database(err),
            },
            _ => Error::Database(err),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Error::Database(ref e) = self {
            tracing::error!("storage failure: {:?}", e);
        }

        // Internal details stay in the logs.
        let detail = match self {
            Error::Database(_) => "internal error".to_string(),
            ref other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "detail": detail, "code": self.code() }))).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
