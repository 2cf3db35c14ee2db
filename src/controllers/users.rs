use axum::{
    extract::{rejection::PathRejection, Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::accounts;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/users/{id}", get(user_detail))
}

// GET /api/users/{id}
async fn user_detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(user_id) = path?;
    let profile = accounts::user_detail(state.store.as_ref(), &user, user_id).await?;
    Ok(Json(profile))
}
