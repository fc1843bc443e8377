//! Centralized error types for the Nimbus application.
//!
//! Library crates keep their own error enums; `AppError` wraps them so the
//! binary has one type to report, with `user_message()` for display.

use std::path::PathBuf;

use nimbus_weather::{OrchestratorError, PoolError, WeatherError};
use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Refresh error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Weather(e) => weather_message(e),
            AppError::Pool(e) => pool_message(e),
            AppError::Orchestrator(OrchestratorError::EmptyCity) => "Enter a city name.",
            AppError::Orchestrator(OrchestratorError::CycleInProgress) => {
                "Weather is already refreshing."
            }
            AppError::Orchestrator(OrchestratorError::Pool(e)) => pool_message(e),
            AppError::Io(_) => "A system resource could not be set up. Try restarting the app.",
        }
    }
}

fn weather_message(e: &WeatherError) -> &'static str {
    match e {
        WeatherError::Transport(_) => "Unable to reach the weather service. Check your connection.",
        WeatherError::RemoteRejected { status: 401 } => "Weather API key is invalid. Check settings.",
        WeatherError::RemoteRejected { status } if *status >= 500 => {
            "Weather service unavailable. Please try again later."
        }
        WeatherError::RemoteRejected { .. } => "Weather service error. Please try again.",
        WeatherError::NotFound(_) => "City not found. Check the name and try again.",
        WeatherError::Parse(_) => "Received unexpected weather data. Please try again.",
        WeatherError::Cancelled => "Weather updates have stopped.",
    }
}

fn pool_message(e: &PoolError) -> &'static str {
    match e {
        PoolError::Closed => "The application is shutting down.",
        _ => "A background task failed. Please try again.",
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration directory on this system")]
    NoConfigDir,

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NoConfigDir => "No settings folder is available. Check your home directory.",
            ConfigError::Io { .. } => "Settings could not be read or saved. Check file permissions.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::Serialize(_) => "Settings could not be saved. Please try again.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_non_empty() {
        let errors: Vec<AppError> = vec![
            ConfigError::Invalid("test".into()).into(),
            ConfigError::NoConfigDir.into(),
            WeatherError::Transport("refused".into()).into(),
            WeatherError::Cancelled.into(),
            PoolError::Closed.into(),
            OrchestratorError::EmptyCity.into(),
            std::io::Error::other("disk").into(),
        ];

        for err in errors {
            assert!(!err.user_message().is_empty(), "{:?}", err);
        }
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = PoolError::Closed.into();
        assert!(matches!(app_err, AppError::Pool(PoolError::Closed)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Weather(WeatherError::RemoteRejected { status: 401 });
        assert_eq!(
            app_err.user_message(),
            "Weather API key is invalid. Check settings."
        );

        let app_err = AppError::Orchestrator(OrchestratorError::Pool(PoolError::Closed));
        assert_eq!(app_err.user_message(), "The application is shutting down.");
    }
}
