//! Weather data for Nimbus
//!
//! Fetches current conditions and forecasts for a set of favorite cities on a
//! fixed-size worker pool, keeps them in a thread-safe cache and falls back to
//! generated data when the weather service is unreachable.

pub mod cache;
pub mod cycle;
pub mod fallback;
pub mod favorites;
pub mod legacy;
pub mod orchestrator;
pub mod pool;
pub mod provider;
pub mod source;
pub mod types;

pub use cache::{CacheEntry, WeatherCache};
pub use cycle::{CycleReport, CycleState, FetchOutcome};
pub use favorites::FavoritesStore;
pub use orchestrator::{DataStatus, Orchestrator, OrchestratorConfig, OrchestratorError, RefreshTimer};
pub use pool::{PoolError, TaskHandle, TaskPool};
pub use provider::{HttpWeatherSource, OpenWeatherClient};
pub use source::{CancelToken, SourceConfig, WeatherSource};
pub use types::*;
