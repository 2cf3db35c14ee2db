pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use config::{Config, StorageBackend};
use store::{MemoryStore, PgStore, Store};

// Shared state for every request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let store: Arc<dyn Store> = match config.database.backend {
            StorageBackend::Postgres => {
                let url = config
                    .database
                    .url
                    .as_deref()
                    .ok_or("DATABASE_URL must be set for the postgres backend")?;
                let pg = PgStore::connect(url, config.database.pool_size).await?;
                info!("Database connected");
                pg.run_migrations().await?;
                Arc::new(pg)
            }
            StorageBackend::Memory => {
                warn!("Using the in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let state = Self::with_store(store, config);
        services::accounts::bootstrap_admin(state.store.as_ref(), &state.config).await?;
        Ok(state)
    }

    pub fn with_store(store: Arc<dyn Store>, config: Config) -> Arc<Self> {
        Arc::new(Self { store, config })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Bus Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
