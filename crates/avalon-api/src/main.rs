//! Avalon API server entry point.

use std::sync::{Arc, Mutex};

use avalon_api::config::AppConfig;
use avalon_api::error::AppError;
use avalon_api::state::AppState;
use avalon_api::{app, build_event_repository, telemetry};
use avalon_core::clock::{Clock, SystemClock};
use avalon_core::id::RandomIdGenerator;
use avalon_core::rng::{DeterministicRng, StdRandom};
use avalon_game::application::command_handlers::TransitionPolicy;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let _telemetry = telemetry::init_tracing(&config)?;

    tracing::info!("Starting Avalon API server");

    let event_repository = build_event_repository(&config).await?;

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock);
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(StdRandom::from_os()));
    let app_state = AppState::new(
        clock,
        rng,
        Arc::new(RandomIdGenerator),
        event_repository,
        TransitionPolicy {
            max_attempts: config.transition_max_attempts,
        },
    );

    let addr = config.bind_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
