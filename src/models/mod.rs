pub mod movie;
pub mod show;
pub mod booking;

pub use movie::Movie;
pub use show::{Show, ShowDetails};
pub use booking::{Booking, BookingStatus, BookingView};
