//! Staff console: list views over buses, seats and bookings plus the
//! per-bus seat reset action.

use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{Bus, Seat};
use crate::services::booking::{format_booking_time, SeatNumber};
use crate::services::catalog::{get_bus, validate_seat_numbers};
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct BusSearch {
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeatFilter {
    #[serde(default)]
    pub bus_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddSeatsRequest {
    #[serde(default)]
    pub seats: Vec<SeatNumber>,
}

/// The bus "change" page: the record and its seats.
#[derive(Debug, Serialize)]
pub struct BusPage {
    pub bus: Bus,
    pub seats: Vec<Seat>,
}

#[derive(Debug, Serialize)]
pub struct SeatRow {
    pub id: i64,
    pub seat_number: String,
    pub bus: String,
    pub is_available: bool,
}

#[derive(Debug, Serialize)]
pub struct BookingRow {
    pub id: i64,
    pub ticket_id: String,
    pub user: String,
    pub bus: String,
    pub seat: String,
    pub booking_time: String,
    pub origin: String,
    pub destination: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ResetOutcome {
    pub bus_id: i64,
    pub seats_reset: u64,
    pub message: String,
}

pub fn change_page_path(bus_id: i64) -> String {
    format!("/api/admin/buses/{}/change", bus_id)
}

pub async fn bus_page(store: &dyn Store, bus_id: i64) -> AppResult<BusPage> {
    let bus = get_bus(store, bus_id).await?;
    let seats = store.list_seats(Some(bus_id)).await?;
    Ok(BusPage { bus, seats })
}

/// Marks every seat of the bus available again.
///
/// Existing bookings are left in place, so after a reset their seats can be
/// sold a second time. The warning below is the only trace of that.
pub async fn reset_seats(store: &dyn Store, bus_id: i64) -> AppResult<ResetOutcome> {
    let bus = get_bus(store, bus_id).await?;

    let outstanding = store.count_bookings_for_bus(bus_id).await?;
    if outstanding > 0 {
        warn!(
            "resetting seats of bus {} while {} booking(s) still reference it",
            bus, outstanding
        );
    }

    let seats_reset = store.reset_seats(bus_id).await?;
    let message = format!("All seats for {} are now available.", bus.bus_name);
    info!("{} ({} seats)", message, seats_reset);

    Ok(ResetOutcome {
        bus_id,
        seats_reset,
        message,
    })
}

pub async fn add_seats(store: &dyn Store, bus_id: i64, req: AddSeatsRequest) -> AppResult<Vec<Seat>> {
    get_bus(store, bus_id).await?;

    let numbers: Vec<String> = req.seats.into_iter().map(SeatNumber::into_string).collect();
    if numbers.is_empty() {
        return Err(AppError::invalid_field("seats", "Provide at least one seat number."));
    }
    validate_seat_numbers(&numbers).map_err(|e| {
        let message = e
            .message
            .map(|m| m.to_string())
            .unwrap_or_else(|| "Invalid seat numbers.".to_string());
        AppError::invalid_field("seats", message)
    })?;

    let added = store.add_seats(bus_id, &numbers).await?;
    info!("added {} seat(s) to bus {}", added.len(), bus_id);
    Ok(added)
}

pub async fn seat_rows(store: &dyn Store, filter: SeatFilter) -> AppResult<Vec<SeatRow>> {
    let names: HashMap<i64, String> = store
        .list_buses(None)
        .await?
        .into_iter()
        .map(|b| (b.id, b.bus_name))
        .collect();

    let seats = store.list_seats(filter.bus_id).await?;
    Ok(seats
        .into_iter()
        .map(|s| SeatRow {
            id: s.id,
            bus: names.get(&s.bus_id).cloned().unwrap_or_default(),
            seat_number: s.seat_number,
            is_available: s.is_available,
        })
        .collect())
}

pub async fn booking_rows(store: &dyn Store, tz: Tz) -> AppResult<Vec<BookingRow>> {
    let records = store.list_bookings().await?;
    Ok(records
        .into_iter()
        .map(|r| BookingRow {
            id: r.id,
            seat: format!("Seat {} - {}", r.seat_number, r.bus_name),
            bus: format!("{} ({})", r.bus_name, r.bus_number),
            ticket_id: r.ticket_id,
            user: r.username,
            booking_time: format_booking_time(r.booking_time, tz),
            origin: r.origin,
            destination: r.destination,
            price: r.price,
        })
        .collect())
}
