//! Avalon: the game bounded context.
//!
//! Responsible for the role and quest tables, the game aggregate, the
//! round-advancement state machine, the optimistic-concurrency transition
//! protocol, and the per-player information-hiding view.

pub mod application;
pub mod domain;
