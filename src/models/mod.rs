pub mod user;
pub mod bus;
pub mod seat;
pub mod booking;

pub use user::{AuthToken, NewUser, User};
pub use bus::{Bus, NewBus};
pub use seat::Seat;
pub use booking::{BookedSeat, Booking, BookingRecord};
