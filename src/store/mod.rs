//! Persistence seam.
//!
//! Handlers and services only talk to [`Store`]. Two implementations exist:
//! [`PgStore`] backed by Postgres, and [`MemoryStore`] which keeps the same
//! tables in process memory behind a single lock.
//!
//! The one operation with a real correctness requirement is
//! [`Store::book_seats`]: the availability check, the seat updates and the
//! booking inserts happen as one atomic unit, so two concurrent requests for
//! the same seat can never both succeed.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{AuthToken, BookedSeat, BookingRecord, Bus, NewBus, NewUser, Seat, User};

/// A request to reserve `seat_numbers` on `bus_id` under one ticket code.
#[derive(Debug, Clone, Copy)]
pub struct SeatBooking<'a> {
    pub user_id: i64,
    pub bus_id: i64,
    pub ticket_id: &'a str,
    pub seat_numbers: &'a [String],
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- users & tokens ---

    /// Fails with `Duplicate { field: "username" }` when the name is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Returns the user's existing token, or stores `candidate_key` as the
    /// new one.
    async fn get_or_create_token(&self, user_id: i64, candidate_key: &str) -> StoreResult<AuthToken>;

    /// Active user owning `key`, if any.
    async fn user_for_token(&self, key: &str) -> StoreResult<Option<User>>;

    // --- buses ---

    /// Case-insensitive substring search over name, number, origin and
    /// destination. `None` lists everything. Ordered by id.
    async fn list_buses(&self, search: Option<&str>) -> StoreResult<Vec<Bus>>;

    async fn find_bus(&self, id: i64) -> StoreResult<Option<Bus>>;

    /// Inserts the bus and its seats together.
    async fn create_bus(&self, bus: NewBus, seat_numbers: &[String]) -> StoreResult<Bus>;

    async fn update_bus(&self, id: i64, bus: NewBus) -> StoreResult<Option<Bus>>;

    /// Removes the bus with its seats and bookings. `false` if it did not exist.
    async fn delete_bus(&self, id: i64) -> StoreResult<bool>;

    // --- seats ---

    /// Seats of one bus, or of all buses, ordered by id.
    async fn list_seats(&self, bus_id: Option<i64>) -> StoreResult<Vec<Seat>>;

    /// Fails with `Duplicate { field: "seat_number" }` when a number is
    /// already used on the bus; nothing is inserted in that case.
    async fn add_seats(&self, bus_id: i64, seat_numbers: &[String]) -> StoreResult<Vec<Seat>>;

    /// Marks every seat of the bus available. Bookings are not consulted.
    async fn reset_seats(&self, bus_id: i64) -> StoreResult<u64>;

    // --- bookings ---

    /// All-or-nothing reservation. Fails with `SeatsUnavailable` unless every
    /// requested number matches a distinct available seat of the bus.
    async fn book_seats(&self, request: SeatBooking<'_>) -> StoreResult<Vec<BookedSeat>>;

    /// The user's bookings joined with bus and seat, newest first.
    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<BookingRecord>>;

    /// Every booking, newest first.
    async fn list_bookings(&self) -> StoreResult<Vec<BookingRecord>>;

    async fn count_bookings_for_bus(&self, bus_id: i64) -> StoreResult<i64>;
}
