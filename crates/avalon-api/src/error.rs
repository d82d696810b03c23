//! Avalon: API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use avalon_core::error::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// Tracing or OpenTelemetry setup error.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// A `DomainError` surfaced to an HTTP caller. Only the state query uses
/// it; writes collapse every failure into `success: false`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl ApiError {
    /// The status a caller sees for this error. A failed precondition is a
    /// conflict with the game's current state.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::AggregateNotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Validation(_) => StatusCode::BAD_REQUEST,
            DomainError::ConcurrencyConflict { .. } | DomainError::PreconditionFailed(_) => {
                StatusCode::CONFLICT
            }
            DomainError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
