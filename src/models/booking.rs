use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// One row per booked seat. Rows created by the same purchase share `ticket_id`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Booking {
    pub id: i64,
    pub ticket_id: String,
    pub user_id: i64,
    pub bus_id: i64,
    pub seat_id: i64,
    pub booking_time: DateTime<Utc>,
}

/// A booking row together with the seat number it reserved.
#[derive(Debug, Clone, PartialEq)]
pub struct BookedSeat {
    pub booking: Booking,
    pub seat_number: String,
}

/// Booking joined with its bus and seat at query time.
///
/// Price, origin and destination are read from the bus as it is now, not
/// as it was when the ticket was bought.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct BookingRecord {
    pub id: i64,
    pub ticket_id: String,
    pub user_id: i64,
    pub username: String,
    pub booking_time: DateTime<Utc>,
    pub seat_number: String,
    pub bus_id: i64,
    pub bus_name: String,
    pub bus_number: String,
    pub origin: String,
    pub destination: String,
    pub price: Decimal,
}
