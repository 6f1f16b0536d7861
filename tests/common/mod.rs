#![allow(dead_code)]

use chrono::{Duration, Utc};
use fake::{Fake, Faker};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::collections::HashMap;
use std::sync::Arc;

use seat_booking::config::Config;
use seat_booking::middleware::Claims;
use seat_booking::models::{Booking, Show};
use seat_booking::services::BookingEngine;
use seat_booking::storage::MemoryStore;
use seat_booking::AppState;

pub const JWT_SECRET: &str = "integration-test-secret";

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("STORAGE_BACKEND", "memory"),
        ("JWT_SECRET", JWT_SECRET),
        ("JWT_LEEWAY_SECONDS", "0"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("test config")
}

pub async fn store_with_show(total_seats: i32) -> (MemoryStore, Show) {
    let store = MemoryStore::new();
    let title: String = Faker.fake();
    let movie = store.add_movie(title, (80..180).fake::<i32>()).await.unwrap();
    let show = store
        .add_show(movie.id, "Screen 1", Utc::now() + Duration::days(1), total_seats)
        .await
        .unwrap();
    (store, show)
}

pub fn engine(store: &MemoryStore) -> BookingEngine {
    BookingEngine::new(Arc::new(store.clone()), Arc::new(store.clone()))
}

pub fn app_state(store: &MemoryStore) -> Arc<AppState> {
    AppState::from_parts(test_config(), Arc::new(store.clone()), Arc::new(store.clone()), None)
}

pub fn token_for(user_id: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as u64,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

/// Active bookings of a show, gathered over the given users.
pub async fn active_bookings(engine: &BookingEngine, show_id: i64, users: impl IntoIterator<Item = i64>) -> Vec<Booking> {
    let mut active = Vec::new();
    for user in users {
        for booking in engine.list_user_bookings(user).await.unwrap() {
            if booking.show_id == show_id && booking.is_active() {
                active.push(booking);
            }
        }
    }
    active
}
