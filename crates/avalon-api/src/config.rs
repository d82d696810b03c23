//! Server configuration, read once from the environment at startup.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use avalon_game::application::command_handlers::DEFAULT_MAX_ATTEMPTS;

use crate::error::AppError;

/// Settings for one server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `HOST`
    pub host: String,
    /// `PORT`
    pub port: u16,
    /// `DATABASE_URL`; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// `DATABASE_MAX_CONNECTIONS`
    pub database_max_connections: u32,
    /// `CACHE_CAPACITY`, in games.
    pub cache_capacity: usize,
    /// `TRANSITION_MAX_ATTEMPTS`; `1` turns off retries on conflict.
    pub transition_max_attempts: u32,
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`; spans are only exported when set.
    pub otlp_endpoint: Option<String>,
    /// `OTEL_SERVICE_NAME`
    pub service_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            database_url: None,
            database_max_connections: 10,
            cache_capacity: 1024,
            transition_max_attempts: DEFAULT_MAX_ATTEMPTS,
            otlp_endpoint: None,
            service_name: "avalon-api".to_owned(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match non_empty(lookup(key)) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw}): {e}"))),
    }
}

impl AppConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults for
    /// anything unset or blank.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a value does not parse or is out of
    /// range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        let config = Self {
            host: non_empty(lookup("HOST")).unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port)?,
            database_url: non_empty(lookup("DATABASE_URL")),
            database_max_connections: parsed(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            cache_capacity: parsed(&lookup, "CACHE_CAPACITY", defaults.cache_capacity)?,
            transition_max_attempts: parsed(
                &lookup,
                "TRANSITION_MAX_ATTEMPTS",
                defaults.transition_max_attempts,
            )?,
            otlp_endpoint: non_empty(lookup("OTEL_EXPORTER_OTLP_ENDPOINT")),
            service_name: non_empty(lookup("OTEL_SERVICE_NAME")).unwrap_or(defaults.service_name),
        };
        if config.transition_max_attempts == 0 {
            return Err(AppError::Config(
                "TRANSITION_MAX_ATTEMPTS must be at least 1".to_owned(),
            ));
        }
        if config.database_max_connections == 0 {
            return Err(AppError::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_owned(),
            ));
        }
        Ok(config)
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid `HOST:PORT` combination.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}
