use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::StaffUser;
use crate::services::catalog::{self, BusPatch, BusPayload};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/buses", get(list_buses).post(create_bus))
        .route(
            "/buses/{id}",
            get(get_bus).put(replace_bus).patch(patch_bus).delete(delete_bus),
        )
        .route("/buses/{id}/seats", get(bus_seats))
}

// GET /api/buses
async fn list_buses(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let buses = catalog::list_buses(state.store.as_ref(), None).await?;
    Ok(Json(buses))
}

// POST /api/buses
async fn create_bus(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    payload: Result<Json<BusPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let bus = catalog::create_bus(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(bus)))
}

// GET /api/buses/{id}
async fn get_bus(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(catalog::get_bus(state.store.as_ref(), id).await?))
}

// PUT /api/buses/{id}
async fn replace_bus(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BusPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(req) = payload?;
    Ok(Json(catalog::replace_bus(state.store.as_ref(), id, req).await?))
}

// PATCH /api/buses/{id}
async fn patch_bus(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BusPatch>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(patch) = payload?;
    Ok(Json(catalog::patch_bus(state.store.as_ref(), id, patch).await?))
}

// DELETE /api/buses/{id}
async fn delete_bus(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    catalog::delete_bus(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/buses/{id}/seats
async fn bus_seats(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(catalog::bus_seats(state.store.as_ref(), id).await?))
}
