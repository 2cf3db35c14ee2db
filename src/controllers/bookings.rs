use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::booking::{self, BookingRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/users/{id}/bookings", get(user_bookings))
}

// POST /api/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let summary =
        booking::book_seats(state.store.as_ref(), state.config.app.time_zone, &user, req).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

// GET /api/users/{id}/bookings
async fn user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Response> {
    let Path(user_id) = path?;
    let tickets =
        booking::user_bookings(state.store.as_ref(), state.config.app.time_zone, &user, user_id)
            .await?;

    if tickets.is_empty() {
        return Ok(Json(json!({ "message": "No bookings found." })).into_response());
    }
    Ok(Json(tickets).into_response())
}
