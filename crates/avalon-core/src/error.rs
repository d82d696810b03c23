//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// Malformed or out-of-range command input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The command is well formed but the aggregate's current state does not
    /// allow it (wrong turn, already voted, game already started, ...).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for optimistic concurrency conflicts, the only error a
    /// caller may resolve by reloading and re-evaluating.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Short machine-readable code for logs and error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AggregateNotFound(_) => "aggregate_not_found",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::Validation(_) => "validation_error",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Infrastructure(_) => "infrastructure_error",
        }
    }
}
