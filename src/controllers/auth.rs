use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::services::accounts::{self, LoginRequest, RegisterRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

// POST /api/register
async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let created = accounts::register(state.store.as_ref(), &state.config, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// POST /api/login
async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let session = accounts::login(state.store.as_ref(), req).await?;
    Ok((StatusCode::OK, Json(session)))
}
