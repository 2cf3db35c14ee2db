use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{SeatBooking, Store};
use crate::error::{StoreError, StoreResult};
use crate::models::{AuthToken, BookedSeat, Booking, BookingRecord, Bus, NewBus, NewUser, Seat, User};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tokens: HashMap<String, AuthToken>,
    buses: BTreeMap<i64, Bus>,
    seats: BTreeMap<i64, Seat>,
    bookings: BTreeMap<i64, Booking>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn bus_number_taken(&self, number: &str, except: Option<i64>) -> bool {
        self.buses
            .values()
            .any(|b| b.bus_number == number && Some(b.id) != except)
    }

    fn record(&self, booking: &Booking) -> Option<BookingRecord> {
        let user = self.users.get(&booking.user_id)?;
        let bus = self.buses.get(&booking.bus_id)?;
        let seat = self.seats.get(&booking.seat_id)?;
        Some(BookingRecord {
            id: booking.id,
            ticket_id: booking.ticket_id.clone(),
            user_id: booking.user_id,
            username: user.username.clone(),
            booking_time: booking.booking_time,
            seat_number: seat.seat_number.clone(),
            bus_id: bus.id,
            bus_name: bus.bus_name.clone(),
            bus_number: bus.bus_number.clone(),
            origin: bus.origin.clone(),
            destination: bus.destination.clone(),
            price: bus.price,
        })
    }

    fn records<'a>(&self, bookings: impl Iterator<Item = &'a Booking>) -> Vec<BookingRecord> {
        let mut records: Vec<BookingRecord> = bookings.filter_map(|b| self.record(b)).collect();
        records.sort_by(|a, b| b.booking_time.cmp(&a.booking_time).then(a.id.cmp(&b.id)));
        records
    }
}

/// Process-local store. Every operation takes the same lock, which makes
/// each one atomic with respect to the others.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate { field: "username" });
        }
        let id = t.next_id();
        let created = User {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            is_staff: user.is_staff,
            is_active: true,
            date_joined: Utc::now(),
        };
        t.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_or_create_token(&self, user_id: i64, candidate_key: &str) -> StoreResult<AuthToken> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t.tokens.values().find(|tok| tok.user_id == user_id) {
            return Ok(existing.clone());
        }
        let token = AuthToken {
            key: candidate_key.to_string(),
            user_id,
            created: Utc::now(),
        };
        t.tokens.insert(token.key.clone(), token.clone());
        Ok(token)
    }

    async fn user_for_token(&self, key: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.tokens
            .get(key)
            .and_then(|tok| t.users.get(&tok.user_id))
            .filter(|u| u.is_active)
            .cloned())
    }

    async fn list_buses(&self, search: Option<&str>) -> StoreResult<Vec<Bus>> {
        let t = self.tables.lock().await;
        let term = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        Ok(t.buses
            .values()
            .filter(|b| match &term {
                None => true,
                Some(term) => [&b.bus_name, &b.bus_number, &b.origin, &b.destination]
                    .iter()
                    .any(|field| field.to_lowercase().contains(term.as_str())),
            })
            .cloned()
            .collect())
    }

    async fn find_bus(&self, id: i64) -> StoreResult<Option<Bus>> {
        Ok(self.tables.lock().await.buses.get(&id).cloned())
    }

    async fn create_bus(&self, bus: NewBus, seat_numbers: &[String]) -> StoreResult<Bus> {
        let mut t = self.tables.lock().await;
        if t.bus_number_taken(&bus.bus_number, None) {
            return Err(StoreError::Duplicate { field: "bus_number" });
        }
        let unique: HashSet<&String> = seat_numbers.iter().collect();
        if unique.len() != seat_numbers.len() {
            return Err(StoreError::Duplicate { field: "seat_numbers" });
        }

        let id = t.next_id();
        let created = Bus::from_new(id, bus);
        t.buses.insert(id, created.clone());
        for number in seat_numbers {
            let seat_id = t.next_id();
            t.seats.insert(
                seat_id,
                Seat {
                    id: seat_id,
                    bus_id: id,
                    seat_number: number.clone(),
                    is_available: true,
                },
            );
        }
        Ok(created)
    }

    async fn update_bus(&self, id: i64, bus: NewBus) -> StoreResult<Option<Bus>> {
        let mut t = self.tables.lock().await;
        if !t.buses.contains_key(&id) {
            return Ok(None);
        }
        if t.bus_number_taken(&bus.bus_number, Some(id)) {
            return Err(StoreError::Duplicate { field: "bus_number" });
        }
        let updated = Bus::from_new(id, bus);
        t.buses.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_bus(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        if t.buses.remove(&id).is_none() {
            return Ok(false);
        }
        t.seats.retain(|_, s| s.bus_id != id);
        t.bookings.retain(|_, b| b.bus_id != id);
        Ok(true)
    }

    async fn list_seats(&self, bus_id: Option<i64>) -> StoreResult<Vec<Seat>> {
        let t = self.tables.lock().await;
        Ok(t.seats
            .values()
            .filter(|s| bus_id.map_or(true, |id| s.bus_id == id))
            .cloned()
            .collect())
    }

    async fn add_seats(&self, bus_id: i64, seat_numbers: &[String]) -> StoreResult<Vec<Seat>> {
        let mut t = self.tables.lock().await;
        let mut taken: HashSet<String> = t
            .seats
            .values()
            .filter(|s| s.bus_id == bus_id)
            .map(|s| s.seat_number.clone())
            .collect();
        for number in seat_numbers {
            if !taken.insert(number.clone()) {
                return Err(StoreError::Duplicate { field: "seat_number" });
            }
        }

        let mut added = Vec::with_capacity(seat_numbers.len());
        for number in seat_numbers {
            let id = t.next_id();
            let seat = Seat {
                id,
                bus_id,
                seat_number: number.clone(),
                is_available: true,
            };
            t.seats.insert(id, seat.clone());
            added.push(seat);
        }
        Ok(added)
    }

    async fn reset_seats(&self, bus_id: i64) -> StoreResult<u64> {
        let mut t = self.tables.lock().await;
        let mut count = 0;
        for seat in t.seats.values_mut().filter(|s| s.bus_id == bus_id) {
            seat.is_available = true;
            count += 1;
        }
        Ok(count)
    }

    async fn book_seats(&self, request: SeatBooking<'_>) -> StoreResult<Vec<BookedSeat>> {
        let mut t = self.tables.lock().await;

        let matched: Vec<i64> = t
            .seats
            .values()
            .filter(|s| {
                s.bus_id == request.bus_id
                    && s.is_available
                    && request.seat_numbers.contains(&s.seat_number)
            })
            .map(|s| s.id)
            .collect();

        if matched.len() != request.seat_numbers.len() {
            return Err(StoreError::SeatsUnavailable);
        }

        let now = Utc::now();
        let mut booked = Vec::with_capacity(matched.len());
        for seat_id in matched {
            let seat_number = match t.seats.get_mut(&seat_id) {
                Some(seat) => {
                    seat.is_available = false;
                    seat.seat_number.clone()
                }
                None => continue,
            };
            let id = t.next_id();
            let booking = Booking {
                id,
                ticket_id: request.ticket_id.to_string(),
                user_id: request.user_id,
                bus_id: request.bus_id,
                seat_id,
                booking_time: now,
            };
            t.bookings.insert(id, booking.clone());
            booked.push(BookedSeat { booking, seat_number });
        }
        Ok(booked)
    }

    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<BookingRecord>> {
        let t = self.tables.lock().await;
        Ok(t.records(t.bookings.values().filter(|b| b.user_id == user_id)))
    }

    async fn list_bookings(&self) -> StoreResult<Vec<BookingRecord>> {
        let t = self.tables.lock().await;
        Ok(t.records(t.bookings.values()))
    }

    async fn count_bookings_for_bus(&self, bus_id: i64) -> StoreResult<i64> {
        let t = self.tables.lock().await;
        Ok(t.bookings.values().filter(|b| b.bus_id == bus_id).count() as i64)
    }
}
