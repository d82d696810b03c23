//! Command abstractions.

use uuid::Uuid;

use crate::error::DomainError;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// Checks the command's own input, without consulting any stored state.
    ///
    /// Runs before the aggregate is loaded, so malformed input never costs
    /// a store round-trip.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first malformed field.
    fn validate(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
