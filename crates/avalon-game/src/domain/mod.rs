//! Domain model for the game context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod quest_sizes;
pub mod resolution;
pub mod roles;
