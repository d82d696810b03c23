//! Avalon Core: shared domain abstractions.
//!
//! This crate defines the traits and types the game context and its
//! collaborators (event store, identifier source, clock, randomness) agree
//! on. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod id;
pub mod repository;
pub mod rng;
