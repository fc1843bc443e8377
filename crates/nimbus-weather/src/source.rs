//! Boundary to the remote weather provider.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::types::{CurrentWeather, Forecast, WeatherError};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_GEO_URL: &str = "https://api.openweathermap.org/geo/1.0";
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Key used when none is configured. The provider rejects it, which routes
/// every fetch through generated fallback data.
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

/// Everything a source needs to reach the provider.
///
/// Sources hold this behind an `Arc` and replace it whole; a request always
/// sees one consistent key/URL pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub base_url: String,
    pub geo_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn has_placeholder_key(&self) -> bool {
        self.api_key.is_empty() || self.api_key == PLACEHOLDER_API_KEY
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            geo_url: DEFAULT_GEO_URL.to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Shared, one-way cancellation signal.
///
/// Clones observe the same token. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), WeatherError> {
        if self.is_cancelled() {
            Err(WeatherError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Blocking access to a weather provider, callable from pool workers.
///
/// Implementations keep no per-call state, so distinct cities may be fetched
/// concurrently. `cancel` is idempotent and permanent: afterwards every call
/// fails with [`WeatherError::Cancelled`] without touching the network, while
/// a call already past its cancellation check finishes normally.
pub trait WeatherSource: Send + Sync {
    fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError>;

    fn fetch_forecast(&self, city: &str, days: u32) -> Result<Forecast, WeatherError>;

    /// Candidate city names for a free-text query, as "Name, CC".
    fn search_cities(&self, query: &str) -> Result<Vec<String>, WeatherError>;

    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(WeatherError::Cancelled)));

        // Idempotent
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_thread_is_seen() {
        let token = CancelToken::new();
        let worker = token.clone();

        std::thread::spawn(move || worker.cancel()).join().unwrap();

        assert!(matches!(token.check(), Err(WeatherError::Cancelled)));
    }

    #[test]
    fn test_placeholder_key_detection() {
        let mut config = SourceConfig::default();
        assert!(config.has_placeholder_key());

        config.api_key = String::new();
        assert!(config.has_placeholder_key());

        config.api_key = "abc123".to_string();
        assert!(!config.has_placeholder_key());
    }
}
