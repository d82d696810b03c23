//! Shared test doubles for the Avalon game engine.

mod clock;
mod id;
mod repository;
mod rng;

pub use clock::{FixedClock, fixed_clock};
pub use id::SequentialIdGenerator;
pub use repository::{
    ConflictingEventRepository, EmptyEventRepository, FailingEventRepository,
    RecordingEventRepository,
};
pub use rng::{MockRng, SequenceRng, identity_shuffle_draws};
