//! Staff-only console routes, mounted under `/api/admin`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::StaffUser;
use crate::services::admin::{self, AddSeatsRequest, BusSearch, SeatFilter};
use crate::services::catalog;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/buses", get(list_buses))
        .route("/buses/{id}/change", get(bus_page))
        .route("/buses/{id}/seats", post(add_seats))
        .route("/buses/{id}/reset-seats", post(reset_seats))
        .route("/seats", get(list_seats))
        .route("/bookings", get(list_bookings))
}

// GET /api/admin/buses?search=
async fn list_buses(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    query: Result<Query<BusSearch>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(params) = query?;
    let buses = catalog::list_buses(state.store.as_ref(), params.search.as_deref()).await?;
    Ok(Json(buses))
}

// GET /api/admin/buses/{id}/change
async fn bus_page(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(admin::bus_page(state.store.as_ref(), id).await?))
}

// POST /api/admin/buses/{id}/seats
async fn add_seats(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<AddSeatsRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(req) = payload?;
    let seats = admin::add_seats(state.store.as_ref(), id, req).await?;
    Ok((StatusCode::CREATED, Json(seats)))
}

// POST /api/admin/buses/{id}/reset-seats
async fn reset_seats(
    State(state): State<Arc<AppState>>,
    StaffUser(staff): StaffUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    let outcome = admin::reset_seats(state.store.as_ref(), id).await?;
    tracing::info!("{} reset {} seat(s) of bus {}", staff.username, outcome.seats_reset, id);
    Ok(Redirect::to(&admin::change_page_path(id)))
}

// GET /api/admin/seats?bus_id=
async fn list_seats(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    query: Result<Query<SeatFilter>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(filter) = query?;
    Ok(Json(admin::seat_rows(state.store.as_ref(), filter).await?))
}

// GET /api/admin/bookings
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        admin::booking_rows(state.store.as_ref(), state.config.app.time_zone).await?,
    ))
}
