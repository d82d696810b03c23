//! Shared application state.

use std::sync::{Arc, Mutex};

use avalon_core::clock::Clock;
use avalon_core::id::IdGenerator;
use avalon_core::repository::EventRepository;
use avalon_core::rng::DeterministicRng;
use avalon_game::application::command_handlers::TransitionPolicy;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for event timestamps.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// RNG for role dealing and the first leader.
    pub rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    /// Source of game, player, quest and event ids.
    pub ids: Arc<dyn IdGenerator>,
    /// Event store.
    pub event_repository: Arc<dyn EventRepository>,
    /// Retry bound for conditional appends.
    pub policy: TransitionPolicy,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock + Send + Sync>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
        ids: Arc<dyn IdGenerator>,
        event_repository: Arc<dyn EventRepository>,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            clock,
            rng,
            ids,
            event_repository,
            policy,
        }
    }
}
