//! Avalon Event Store: implementations of the `EventRepository` trait.
//!
//! `InMemoryEventRepository` keeps streams in process and publishes every
//! committed event on a change feed. `PgEventRepository` persists streams in
//! `PostgreSQL`. `CachedEventRepository` sits in front of either as a
//! read-side cache.

pub mod cached_event_repository;
pub mod in_memory_event_repository;
pub mod pg_event_repository;

pub use cached_event_repository::CachedEventRepository;
pub use in_memory_event_repository::InMemoryEventRepository;
pub use pg_event_repository::PgEventRepository;
