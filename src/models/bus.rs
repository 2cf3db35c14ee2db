use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Bus {
    pub id: i64,
    pub bus_name: String,
    pub bus_number: String,
    pub origin: String,
    pub destination: String,
    pub features: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub no_of_seats: i64,
    pub price: Decimal,
}

/// Descriptive fields of a bus, used for both inserts and full updates.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBus {
    pub bus_name: String,
    pub bus_number: String,
    pub origin: String,
    pub destination: String,
    pub features: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub no_of_seats: i64,
    pub price: Decimal,
}

impl Bus {
    pub fn from_new(id: i64, bus: NewBus) -> Self {
        Bus {
            id,
            bus_name: bus.bus_name,
            bus_number: bus.bus_number,
            origin: bus.origin,
            destination: bus.destination,
            features: bus.features,
            start_time: bus.start_time,
            end_time: bus.end_time,
            no_of_seats: bus.no_of_seats,
            price: bus.price,
        }
    }

    pub fn to_new(&self) -> NewBus {
        NewBus {
            bus_name: self.bus_name.clone(),
            bus_number: self.bus_number.clone(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            features: self.features.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            no_of_seats: self.no_of_seats,
            price: self.price,
        }
    }
}

impl std::fmt::Display for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.bus_name, self.bus_number)
    }
}
