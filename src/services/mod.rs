pub mod booking;

pub use booking::BookingEngine;
