use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::middleware::AuthUser;
use crate::models::{Booking, BookingView, ShowDetails};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows/{show_id}/book", post(book_seat))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking))
        .route("/my-bookings", get(my_bookings))
}

/* ---------- helpers ---------- */

async fn show_details(state: &AppState, show_id: i64) -> Result<ShowDetails> {
    let catalog = state.engine.catalog();
    let show = catalog.get_show(show_id).await?.ok_or(Error::NotFound("show"))?;
    let movie = catalog.get_movie(show.movie_id).await?.ok_or(Error::NotFound("movie"))?;
    Ok(ShowDetails::new(show, movie))
}

async fn booking_views(state: &AppState, bookings: Vec<Booking>) -> Result<Vec<BookingView>> {
    let mut shows: HashMap<i64, ShowDetails> = HashMap::new();
    let mut views = Vec::with_capacity(bookings.len());
    for booking in bookings {
        let show = match shows.get(&booking.show_id) {
            Some(show) => show.clone(),
            None => {
                let show = show_details(state, booking.show_id).await?;
                shows.insert(booking.show_id, show.clone());
                show
            }
        };
        views.push(BookingView::new(booking, show));
    }
    Ok(views)
}

// Reads the booking body as JSON or as a urlencoded form. An empty body
// reads as no fields, so a missing seat_number is reported by the engine.
fn booking_fields(headers: &HeaderMap, body: &Bytes) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let fields: HashMap<String, String> = serde_urlencoded::from_bytes(body)
            .map_err(|e| Error::InvalidInput(format!("malformed form body: {}", e)))?;
        Ok(json!(fields))
    } else {
        serde_json::from_slice(body).map_err(|e| Error::InvalidInput(format!("malformed JSON body: {}", e)))
    }
}

/* ---------- BOOKINGS ---------- */

// POST /api/shows/{show_id}/book  {"seat_number": 3} or seat_number=3
async fn book_seat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(show_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<BookingView>)> {
    let fields = booking_fields(&headers, &body)?;
    let booking = state.engine.reserve(user.user_id, show_id, fields.get("seat_number")).await?;
    let show = show_details(&state, booking.show_id).await?;
    Ok((StatusCode::CREATED, Json(BookingView::new(booking, show))))
}

// POST /api/bookings/{booking_id}/cancel
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> Result<Json<Value>> {
    let booking = state.engine.cancel(user.user_id, booking_id).await?;
    Ok(Json(json!({
        "detail": "booking cancelled",
        "booking_id": booking.id,
        "status": booking.status,
    })))
}

// GET /api/my-bookings
async fn my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<BookingView>>> {
    let bookings = state.engine.list_user_bookings(user.user_id).await?;
    Ok(Json(booking_views(&state, bookings).await?))
}
