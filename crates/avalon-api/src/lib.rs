//! Avalon: HTTP API server library.
//!
//! Exposes the router, state, and startup wiring so the binary and the
//! integration tests build the same application.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use avalon_core::repository::EventRepository;
use avalon_event_store::{CachedEventRepository, InMemoryEventRepository, PgEventRepository};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Builds the full router.
pub fn app(state: AppState) -> Router {
    // Any origin may call in. Player tokens travel in the path, never in cookies.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/games", routes::games::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Builds the event store: PostgreSQL when `DATABASE_URL` is set, otherwise
/// an in-process store. Either way reads go through a stream cache.
///
/// # Errors
///
/// Returns `AppError::Database` if the pool cannot connect and
/// `AppError::Migration` if the schema cannot be brought up to date.
pub async fn build_event_repository(
    config: &AppConfig,
) -> Result<Arc<dyn EventRepository>, AppError> {
    if let Some(database_url) = config.database_url.as_deref() {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("using PostgreSQL event store");

        let store = Arc::new(PgEventRepository::new(pool));
        return Ok(Arc::new(CachedEventRepository::new(
            store,
            config.cache_capacity,
        )));
    }

    info!("DATABASE_URL not set, using in-memory event store");
    let store = Arc::new(InMemoryEventRepository::new());
    let cached = CachedEventRepository::new(store.clone(), config.cache_capacity);
    // The follower task ends once the store and its feed sender are dropped.
    drop(cached.follow(store.subscribe()));
    Ok(Arc::new(cached))
}
