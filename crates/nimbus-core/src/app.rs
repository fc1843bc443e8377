use std::future::Future;
use std::sync::Arc;

use nimbus_weather::{
    CycleReport, FavoritesStore, HttpWeatherSource, OpenWeatherClient, Orchestrator,
    RefreshTimer, TaskPool, WeatherCache,
};
use tokio::runtime::Runtime;

use crate::{AppError, Config};

/// Main application state and lifecycle manager
///
/// Fields drop in order: the timer and pool stop before the runtime their
/// requests run on.
pub struct App {
    timer: Option<RefreshTimer>,
    orchestrator: Arc<Orchestrator>,
    source: Arc<HttpWeatherSource>,
    config: Arc<Config>,
    runtime: Runtime,
}

impl App {
    /// Create a new application instance from the on-disk configuration
    pub fn new() -> Result<Self, AppError> {
        let config = Config::load()?;
        Self::with_config(config)
    }

    /// Build the weather components for `config` without fetching anything
    pub fn with_config(config: Config) -> Result<Self, AppError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("nimbus-io")
            .build()?;

        let client = OpenWeatherClient::new(config.source_config())?;
        let source = Arc::new(HttpWeatherSource::new(client, runtime.handle().clone()));

        let pool = TaskPool::new(config.weather.worker_threads)?;
        let favorites = FavoritesStore::open(config.favorites_path());

        let orchestrator = Orchestrator::new(
            Arc::new(pool),
            Arc::new(WeatherCache::new()),
            Arc::new(favorites),
            source.clone(),
            config.orchestrator_config(),
        );

        Ok(Self {
            timer: None,
            orchestrator: Arc::new(orchestrator),
            source,
            config: Arc::new(config),
            runtime,
        })
    }

    /// Warm the cache, seed default cities, run the first refresh and start
    /// the periodic timer.
    pub fn initialize(&mut self) -> Result<CycleReport, AppError> {
        tracing::info!("Initializing application");

        self.orchestrator.restore_snapshot();

        let favorites = self.orchestrator.favorites();
        if favorites.is_empty() {
            tracing::info!(
                "No favorite cities, adding {} defaults",
                self.config.weather.default_cities.len()
            );
            for city in &self.config.weather.default_cities {
                if let Err(e) = favorites.add(city) {
                    tracing::warn!("Could not save default city {}: {}", city, e);
                }
            }
        }

        let report = self.orchestrator.refresh_all()?;

        if let Some(interval) = self.config.refresh_interval() {
            self.timer = Some(self.orchestrator.start_periodic(interval));
        }

        tracing::info!("Application initialized successfully");
        Ok(report)
    }

    /// Stop the timer, drain pending fetches and save the cache
    pub fn shutdown(&mut self) -> Result<(), AppError> {
        tracing::info!("Shutting down application");

        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        self.orchestrator.shutdown();

        Ok(())
    }

    /// Save a new API key and use it from the next request on.
    pub fn set_api_key(&self, key: &str) -> Result<(), AppError> {
        self.config.save_api_key(key)?;

        let client = self.source.client();
        let mut source_config = (*client.config()).clone();
        source_config.api_key = key.trim().to_string();
        client.replace_config(source_config);

        tracing::info!("Weather API key updated");
        Ok(())
    }

    /// Run a future on the application runtime from synchronous code
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}
