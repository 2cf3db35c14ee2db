use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{SeatBooking, Store};
use crate::error::{StoreError, StoreResult};
use crate::models::{AuthToken, BookedSeat, Booking, BookingRecord, Bus, NewBus, NewUser, Seat, User};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, is_staff, is_active, date_joined";

const BUS_COLUMNS: &str =
    "id, bus_name, bus_number, origin, destination, features, start_time, end_time, no_of_seats, price";

const BOOKING_RECORD_SELECT: &str = r#"
    SELECT b.id, b.ticket_id, b.user_id, u.username, b.booking_time, s.seat_number,
           bu.id AS bus_id, bu.bus_name, bu.bus_number, bu.origin, bu.destination, bu.price
    FROM bookings b
    JOIN users u ON u.id = b.user_id
    JOIN buses bu ON bu.id = b.bus_id
    JOIN seats s ON s.id = b.seat_id
"#;

#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(PgStore { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }
}

// Maps a unique-constraint violation onto the field it protects
fn unique_violation(err: sqlx::Error, field: &'static str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate { field },
        _ => StoreError::Database(err),
    }
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, is_staff)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.is_staff)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "username"))
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_or_create_token(&self, user_id: i64, candidate_key: &str) -> StoreResult<AuthToken> {
        sqlx::query(
            "INSERT INTO auth_tokens (key, user_id) VALUES ($1, $2)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(candidate_key)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as::<_, AuthToken>(
            "SELECT key, user_id, created FROM auth_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn user_for_token(&self, key: &str) -> StoreResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users
             WHERE id = (SELECT user_id FROM auth_tokens WHERE key = $1) AND is_active",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_buses(&self, search: Option<&str>) -> StoreResult<Vec<Bus>> {
        let buses = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let sql = format!(
                    "SELECT {} FROM buses
                     WHERE bus_name ILIKE $1 OR bus_number ILIKE $1
                        OR origin ILIKE $1 OR destination ILIKE $1
                     ORDER BY id",
                    BUS_COLUMNS
                );
                sqlx::query_as::<_, Bus>(&sql)
                    .bind(like_pattern(term))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT {} FROM buses ORDER BY id", BUS_COLUMNS);
                sqlx::query_as::<_, Bus>(&sql).fetch_all(&self.pool).await?
            }
        };
        Ok(buses)
    }

    async fn find_bus(&self, id: i64) -> StoreResult<Option<Bus>> {
        let sql = format!("SELECT {} FROM buses WHERE id = $1", BUS_COLUMNS);
        Ok(sqlx::query_as::<_, Bus>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_bus(&self, bus: NewBus, seat_numbers: &[String]) -> StoreResult<Bus> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO buses (bus_name, bus_number, origin, destination, features,
                                start_time, end_time, no_of_seats, price)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            BUS_COLUMNS
        );
        let created = sqlx::query_as::<_, Bus>(&sql)
            .bind(&bus.bus_name)
            .bind(&bus.bus_number)
            .bind(&bus.origin)
            .bind(&bus.destination)
            .bind(&bus.features)
            .bind(bus.start_time)
            .bind(bus.end_time)
            .bind(bus.no_of_seats)
            .bind(bus.price)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, "bus_number"))?;

        if !seat_numbers.is_empty() {
            sqlx::query(
                "INSERT INTO seats (bus_id, seat_number)
                 SELECT $1, UNNEST($2::TEXT[])",
            )
            .bind(created.id)
            .bind(seat_numbers)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, "seat_numbers"))?;
        }

        tx.commit().await?;
        debug!("created bus {} with {} seats", created.id, seat_numbers.len());
        Ok(created)
    }

    async fn update_bus(&self, id: i64, bus: NewBus) -> StoreResult<Option<Bus>> {
        let sql = format!(
            "UPDATE buses
             SET bus_name = $2, bus_number = $3, origin = $4, destination = $5, features = $6,
                 start_time = $7, end_time = $8, no_of_seats = $9, price = $10
             WHERE id = $1
             RETURNING {}",
            BUS_COLUMNS
        );
        sqlx::query_as::<_, Bus>(&sql)
            .bind(id)
            .bind(&bus.bus_name)
            .bind(&bus.bus_number)
            .bind(&bus.origin)
            .bind(&bus.destination)
            .bind(&bus.features)
            .bind(bus.start_time)
            .bind(bus.end_time)
            .bind(bus.no_of_seats)
            .bind(bus.price)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "bus_number"))
    }

    async fn delete_bus(&self, id: i64) -> StoreResult<bool> {
        // seats and bookings go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM buses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_seats(&self, bus_id: Option<i64>) -> StoreResult<Vec<Seat>> {
        Ok(sqlx::query_as::<_, Seat>(
            "SELECT id, bus_id, seat_number, is_available FROM seats
             WHERE $1::BIGINT IS NULL OR bus_id = $1
             ORDER BY id",
        )
        .bind(bus_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_seats(&self, bus_id: i64, seat_numbers: &[String]) -> StoreResult<Vec<Seat>> {
        Ok(sqlx::query_as::<_, Seat>(
            "INSERT INTO seats (bus_id, seat_number)
             SELECT $1, UNNEST($2::TEXT[])
             RETURNING id, bus_id, seat_number, is_available",
        )
        .bind(bus_id)
        .bind(seat_numbers)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "seat_number"))?)
    }

    async fn reset_seats(&self, bus_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE seats SET is_available = TRUE WHERE bus_id = $1")
            .bind(bus_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn book_seats(&self, request: SeatBooking<'_>) -> StoreResult<Vec<BookedSeat>> {
        let mut tx = self.pool.begin().await?;

        // Row locks on the candidate seats. A concurrent transaction holding
        // one of them makes us wait; once it commits the row is re-checked
        // against `is_available` and drops out of the result.
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT id, bus_id, seat_number, is_available FROM seats
             WHERE bus_id = $1 AND seat_number = ANY($2) AND is_available
             ORDER BY id
             FOR UPDATE",
        )
        .bind(request.bus_id)
        .bind(request.seat_numbers)
        .fetch_all(&mut *tx)
        .await?;

        if seats.len() != request.seat_numbers.len() {
            tx.rollback().await?;
            return Err(StoreError::SeatsUnavailable);
        }

        let seat_ids: Vec<i64> = seats.iter().map(|s| s.id).collect();

        sqlx::query("UPDATE seats SET is_available = FALSE WHERE id = ANY($1)")
            .bind(&seat_ids)
            .execute(&mut *tx)
            .await?;

        let bookings = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (ticket_id, user_id, bus_id, seat_id)
             SELECT $1, $2, $3, UNNEST($4::BIGINT[])
             RETURNING id, ticket_id, user_id, bus_id, seat_id, booking_time",
        )
        .bind(request.ticket_id)
        .bind(request.user_id)
        .bind(request.bus_id)
        .bind(&seat_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut numbers: HashMap<i64, String> =
            seats.into_iter().map(|s| (s.id, s.seat_number)).collect();
        let mut booked: Vec<BookedSeat> = bookings
            .into_iter()
            .filter_map(|booking| {
                numbers
                    .remove(&booking.seat_id)
                    .map(|seat_number| BookedSeat { booking, seat_number })
            })
            .collect();
        booked.sort_by_key(|b| b.booking.id);
        Ok(booked)
    }

    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<BookingRecord>> {
        let sql = format!(
            "{} WHERE b.user_id = $1 ORDER BY b.booking_time DESC, b.id",
            BOOKING_RECORD_SELECT
        );
        Ok(sqlx::query_as::<_, BookingRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_bookings(&self) -> StoreResult<Vec<BookingRecord>> {
        let sql = format!("{} ORDER BY b.booking_time DESC, b.id", BOOKING_RECORD_SELECT);
        Ok(sqlx::query_as::<_, BookingRecord>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_bookings_for_bus(&self, bus_id: i64) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bookings WHERE bus_id = $1")
            .bind(bus_id)
            .fetch_one(&self.pool)
            .await?)
    }
}
