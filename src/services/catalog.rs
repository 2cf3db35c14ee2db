//! Bus catalog: list/create/retrieve/update/delete plus seat listing.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};
use crate::models::{Bus, NewBus, Seat};
use crate::store::Store;

const MAX_SEAT_NUMBER_LEN: usize = 10;

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

fn de_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_time(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid time {:?}, expected HH:MM[:SS]", raw)))
}

fn de_optional_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_time(&raw).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid time {:?}, expected HH:MM[:SS]", raw))
        }),
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    // NUMERIC(10, 2)
    let limit = Decimal::from(100_000_000i64);
    if price.is_sign_negative() || price.normalize().scale() > 2 || *price >= limit {
        return Err(ValidationError::new("price").with_message(Cow::Borrowed(
            "Ensure the price is non-negative with at most 8 digits before and 2 after the decimal point.",
        )));
    }
    Ok(())
}

pub fn validate_seat_numbers(numbers: &[String]) -> Result<(), ValidationError> {
    if numbers
        .iter()
        .any(|n| n.trim().is_empty() || n.chars().count() > MAX_SEAT_NUMBER_LEN)
    {
        return Err(ValidationError::new("seat_numbers").with_message(Cow::Borrowed(
            "Each seat number must have between 1 and 10 characters.",
        )));
    }
    let unique: HashSet<&str> = numbers.iter().map(String::as_str).collect();
    if unique.len() != numbers.len() {
        return Err(ValidationError::new("seat_numbers")
            .with_message(Cow::Borrowed("Seat numbers must be unique.")));
    }
    Ok(())
}

#[allow(clippy::ptr_arg)]
fn validate_seat_number_list(numbers: &Vec<String>) -> Result<(), ValidationError> {
    validate_seat_numbers(numbers)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BusPayload {
    #[validate(length(min = 1, max = 100, message = "Ensure this field has between 1 and 100 characters."))]
    pub bus_name: String,

    #[validate(length(min = 1, max = 20, message = "Ensure this field has between 1 and 20 characters."))]
    pub bus_number: String,

    #[validate(length(min = 1, max = 50, message = "Ensure this field has between 1 and 50 characters."))]
    pub origin: String,

    #[validate(length(min = 1, max = 50, message = "Ensure this field has between 1 and 50 characters."))]
    pub destination: String,

    #[serde(default)]
    pub features: String,

    #[serde(deserialize_with = "de_time")]
    pub start_time: NaiveTime,

    #[serde(deserialize_with = "de_time")]
    pub end_time: NaiveTime,

    #[validate(range(min = 0, max = 1000, message = "Ensure this value is between 0 and 1000."))]
    pub no_of_seats: i64,

    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,

    /// Only read on create. Defaults to "1".."n" for `no_of_seats = n`.
    #[serde(default)]
    #[validate(custom(function = "validate_seat_number_list"))]
    pub seat_numbers: Option<Vec<String>>,
}

impl BusPayload {
    fn normalize(&mut self) {
        for field in [
            &mut self.bus_name,
            &mut self.bus_number,
            &mut self.origin,
            &mut self.destination,
        ] {
            *field = field.trim().to_string();
        }
        if let Some(numbers) = self.seat_numbers.as_mut() {
            for n in numbers.iter_mut() {
                *n = n.trim().to_string();
            }
        }
    }

    fn into_parts(self) -> (NewBus, Option<Vec<String>>) {
        // NUMERIC(10, 2) on the way out of postgres; keep the memory store identical
        let mut price = self.price;
        price.rescale(2);
        let bus = NewBus {
            bus_name: self.bus_name,
            bus_number: self.bus_number,
            origin: self.origin,
            destination: self.destination,
            features: self.features,
            start_time: self.start_time,
            end_time: self.end_time,
            no_of_seats: self.no_of_seats,
            price,
        };
        (bus, self.seat_numbers)
    }
}

impl From<NewBus> for BusPayload {
    fn from(bus: NewBus) -> Self {
        BusPayload {
            bus_name: bus.bus_name,
            bus_number: bus.bus_number,
            origin: bus.origin,
            destination: bus.destination,
            features: bus.features,
            start_time: bus.start_time,
            end_time: bus.end_time,
            no_of_seats: bus.no_of_seats,
            price: bus.price,
            seat_numbers: None,
        }
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct BusPatch {
    #[serde(default)]
    pub bus_name: Option<String>,
    #[serde(default)]
    pub bus_number: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub features: Option<String>,
    #[serde(default, deserialize_with = "de_optional_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "de_optional_time")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub no_of_seats: Option<i64>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl BusPatch {
    fn apply(self, current: NewBus) -> BusPayload {
        let mut merged = BusPayload::from(current);
        if let Some(v) = self.bus_name {
            merged.bus_name = v;
        }
        if let Some(v) = self.bus_number {
            merged.bus_number = v;
        }
        if let Some(v) = self.origin {
            merged.origin = v;
        }
        if let Some(v) = self.destination {
            merged.destination = v;
        }
        if let Some(v) = self.features {
            merged.features = v;
        }
        if let Some(v) = self.start_time {
            merged.start_time = v;
        }
        if let Some(v) = self.end_time {
            merged.end_time = v;
        }
        if let Some(v) = self.no_of_seats {
            merged.no_of_seats = v;
        }
        if let Some(v) = self.price {
            merged.price = v;
        }
        merged
    }
}

fn bus_not_found() -> AppError {
    AppError::NotFound("Bus not found.".to_string())
}

pub fn default_seat_numbers(no_of_seats: i64) -> Vec<String> {
    (1..=no_of_seats).map(|n| n.to_string()).collect()
}

pub async fn list_buses(store: &dyn Store, search: Option<&str>) -> AppResult<Vec<Bus>> {
    Ok(store.list_buses(search).await?)
}

pub async fn get_bus(store: &dyn Store, id: i64) -> AppResult<Bus> {
    store.find_bus(id).await?.ok_or_else(bus_not_found)
}

pub async fn create_bus(store: &dyn Store, mut payload: BusPayload) -> AppResult<Bus> {
    payload.normalize();
    payload.validate()?;
    let (bus, seat_numbers) = payload.into_parts();
    let seat_numbers = seat_numbers.unwrap_or_else(|| default_seat_numbers(bus.no_of_seats));

    let created = store.create_bus(bus, &seat_numbers).await?;
    info!("created bus {} with {} seats", created, seat_numbers.len());
    Ok(created)
}

pub async fn replace_bus(store: &dyn Store, id: i64, mut payload: BusPayload) -> AppResult<Bus> {
    payload.normalize();
    payload.validate()?;
    let (bus, _) = payload.into_parts();
    let updated = store.update_bus(id, bus).await?.ok_or_else(bus_not_found)?;
    info!("updated bus {}", updated);
    Ok(updated)
}

pub async fn patch_bus(store: &dyn Store, id: i64, patch: BusPatch) -> AppResult<Bus> {
    let current = get_bus(store, id).await?;
    let mut merged = patch.apply(current.to_new());
    merged.normalize();
    merged.validate()?;
    let (bus, _) = merged.into_parts();
    let updated = store.update_bus(id, bus).await?.ok_or_else(bus_not_found)?;
    info!("patched bus {}", updated);
    Ok(updated)
}

pub async fn delete_bus(store: &dyn Store, id: i64) -> AppResult<()> {
    if !store.delete_bus(id).await? {
        return Err(bus_not_found());
    }
    info!("deleted bus {} with its seats and bookings", id);
    Ok(())
}

pub async fn bus_seats(store: &dyn Store, id: i64) -> AppResult<Vec<Seat>> {
    get_bus(store, id).await?;
    Ok(store.list_seats(Some(id)).await?)
}
