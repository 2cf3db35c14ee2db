use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub bus_id: i64,
    pub seat_number: String,
    pub is_available: bool,
}
