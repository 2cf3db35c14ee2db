//! Seat booking and per-user booking history.
//!
//! A purchase reserves one or more seats of a single bus under one ticket
//! code. The reservation itself is delegated to [`Store::book_seats`], which
//! runs the availability check and the writes atomically; this module handles
//! input checks, ticket codes and the response shapes.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, StoreError};
use crate::middleware::AuthUser;
use crate::models::BookingRecord;
use crate::store::{SeatBooking, Store};

/// A seat number as sent by clients: `"A1"` or `12`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SeatNumber {
    Text(String),
    Number(i64),
}

impl SeatNumber {
    pub fn into_string(self) -> String {
        match self {
            SeatNumber::Text(s) => s,
            SeatNumber::Number(n) => n.to_string(),
        }
    }
}

/// Malformed `bus_id` or `seats` values read as absent, so they get the same
/// answer as a missing field.
#[derive(Debug, Default, Deserialize)]
pub struct BookingRequest {
    #[serde(default, deserialize_with = "de_bus_id")]
    pub bus_id: Option<i64>,
    #[serde(default, deserialize_with = "de_seats")]
    pub seats: Option<Vec<SeatNumber>>,
}

// `3` or `"3"`
fn de_bus_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn de_seats<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<SeatNumber>>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => None,
    })
}

#[derive(Debug, Serialize)]
pub struct BookingSummary {
    pub message: String,
    pub ticket_id: String,
    pub bus_name: String,
    pub bus_number: String,
    pub seats: Vec<String>,
    pub origin: String,
    pub destination: String,
    pub price_per_seat: String,
    pub total_price: String,
    pub booking_time: String,
}

/// One purchase event as shown in a user's history.
#[derive(Debug, Serialize)]
pub struct TicketSummary {
    pub ticket_id: String,
    pub bus_name: String,
    pub bus_number: String,
    pub origin: String,
    pub destination: String,
    pub price_per_seat: String,
    pub seats: Vec<String>,
    pub booking_time: String,
    pub total_price: String,
}

/// Booking rows sharing a ticket code, folded together.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketGroup {
    pub ticket_id: String,
    pub bus_name: String,
    pub bus_number: String,
    pub origin: String,
    pub destination: String,
    pub price_per_seat: Decimal,
    pub seats: Vec<String>,
    pub booking_time: DateTime<Utc>,
}

impl TicketGroup {
    /// Recomputed from the bus's current price.
    pub fn total_price(&self) -> Decimal {
        self.price_per_seat * Decimal::from(self.seats.len())
    }

    fn into_summary(self, tz: Tz) -> TicketSummary {
        let total = self.total_price();
        TicketSummary {
            ticket_id: self.ticket_id,
            bus_name: self.bus_name,
            bus_number: self.bus_number,
            origin: self.origin,
            destination: self.destination,
            price_per_seat: format_price(self.price_per_seat),
            seats: self.seats,
            booking_time: format_booking_time(self.booking_time, tz),
            total_price: format_price(total),
        }
    }
}

/// `TKT-` followed by 8 uppercase hex characters.
pub fn generate_ticket_code() -> String {
    let mut buf = Uuid::encode_buffer();
    let hex = Uuid::new_v4().simple().encode_upper(&mut buf);
    format!("TKT-{}", &hex[..8])
}

pub fn format_price(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

pub fn format_booking_time(time: DateTime<Utc>, tz: Tz) -> String {
    time.with_timezone(&tz)
        .format("%Y-%m-%dT%H:%M:%S%.6f%:z")
        .to_string()
}

/// Reserves every requested seat of the bus for `user`, or none of them.
pub async fn book_seats(
    store: &dyn Store,
    tz: Tz,
    user: &AuthUser,
    req: BookingRequest,
) -> AppResult<BookingSummary> {
    let bus_id = match req.bus_id {
        Some(id) if id > 0 => id,
        _ => return Err(AppError::invalid("Please provide bus_id.")),
    };

    let seat_numbers: Vec<String> = match req.seats {
        Some(seats) if !seats.is_empty() => seats.into_iter().map(SeatNumber::into_string).collect(),
        _ => return Err(AppError::invalid("Please provide a list of seat numbers.")),
    };

    let bus = store
        .find_bus(bus_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus not found.".to_string()))?;

    let ticket_id = generate_ticket_code();
    let booked = store
        .book_seats(SeatBooking {
            user_id: user.user_id,
            bus_id,
            ticket_id: &ticket_id,
            seat_numbers: &seat_numbers,
        })
        .await
        .map_err(|e| {
            if let StoreError::SeatsUnavailable = e {
                warn!(
                    "user {} could not book seats {:?} on bus {}",
                    user.user_id, seat_numbers, bus_id
                );
            }
            AppError::from(e)
        })?;

    let booking_time = booked
        .iter()
        .map(|b| b.booking.booking_time)
        .min()
        .ok_or_else(|| AppError::Internal(format!("ticket {} created no bookings", ticket_id)))?;

    let total_price = bus.price * Decimal::from(booked.len());
    info!(
        "user {} booked {} seat(s) on bus {} as {}",
        user.user_id,
        booked.len(),
        bus.id,
        ticket_id
    );

    Ok(BookingSummary {
        message: format!("{} seat(s) booked successfully!", booked.len()),
        ticket_id,
        bus_name: bus.bus_name,
        bus_number: bus.bus_number,
        seats: seat_numbers,
        origin: bus.origin,
        destination: bus.destination,
        price_per_seat: format_price(bus.price),
        total_price: format_price(total_price),
        booking_time: format_booking_time(booking_time, tz),
    })
}

/// Folds booking rows into one group per ticket code, newest purchase first.
/// Seats keep the order in which their rows appear.
pub fn group_by_ticket(records: &[BookingRecord]) -> Vec<TicketGroup> {
    let mut groups: Vec<TicketGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        match index.get(record.ticket_id.as_str()) {
            Some(&i) => {
                let group = &mut groups[i];
                group.seats.push(record.seat_number.clone());
                if record.booking_time < group.booking_time {
                    group.booking_time = record.booking_time;
                }
            }
            None => {
                index.insert(record.ticket_id.as_str(), groups.len());
                groups.push(TicketGroup {
                    ticket_id: record.ticket_id.clone(),
                    bus_name: record.bus_name.clone(),
                    bus_number: record.bus_number.clone(),
                    origin: record.origin.clone(),
                    destination: record.destination.clone(),
                    price_per_seat: record.price,
                    seats: vec![record.seat_number.clone()],
                    booking_time: record.booking_time,
                });
            }
        }
    }

    groups.sort_by(|a, b| b.booking_time.cmp(&a.booking_time));
    groups
}

/// Booking history of `user_id`. Only the user themself may read it.
pub async fn user_bookings(
    store: &dyn Store,
    tz: Tz,
    requester: &AuthUser,
    user_id: i64,
) -> AppResult<Vec<TicketSummary>> {
    if requester.user_id != user_id {
        return Err(AppError::Unauthorized(
            "You are not authorized to view these bookings.".to_string(),
        ));
    }

    let records = store.bookings_for_user(user_id).await?;
    Ok(group_by_ticket(&records)
        .into_iter()
        .map(|g| g.into_summary(tz))
        .collect())
}
