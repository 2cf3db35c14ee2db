pub mod admin;
pub mod auth;
pub mod bookings;
pub mod buses;
pub mod users;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(buses::routes())
        .merge(bookings::routes())
        .merge(users::routes())
        .nest("/admin", admin::routes())
}
