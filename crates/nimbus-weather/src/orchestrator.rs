//! Ties the pool, cache, favorites and source together.
//!
//! One fetch task per tracked city runs on the pool. A task fetches current
//! weather, then the forecast, then writes both into the cache; any failure
//! is replaced by generated data so a tracked city is never left empty.
//! Locks are never held across components: favorites and cache are each
//! locked and released on their own. The orchestrator's own removed-city set
//! is held around a task's cache write, so a removal either precedes the
//! write (which is skipped) or follows it (and deletes what was written).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::cache::WeatherCache;
use crate::cycle::{CycleReport, CycleState, FetchOutcome};
use crate::fallback;
use crate::favorites::FavoritesStore;
use crate::legacy;
use crate::pool::{PoolError, TaskHandle, TaskPool};
use crate::source::WeatherSource;
use crate::types::{CurrentWeather, Forecast, WeatherError};

pub const DEFAULT_FORECAST_DAYS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("City name is empty")]
    EmptyCity,
    #[error("A refresh cycle is already running")]
    CycleInProgress,
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Days of forecast requested per city
    pub forecast_days: u32,
    /// Where the cache snapshot is written after each cycle
    pub cache_file: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            forecast_days: DEFAULT_FORECAST_DAYS,
            cache_file: None,
        }
    }
}

/// Whether a city's cached data should be presented as live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    Missing,
    Live,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CityOrigin {
    Favorite,
    Known,
}

/// The pieces a fetch task needs, cloned into each task.
#[derive(Clone)]
struct FetchContext {
    cache: Arc<WeatherCache>,
    favorites: Arc<FavoritesStore>,
    source: Arc<dyn WeatherSource>,
    /// Cities removed by the user and not re-added since
    removed: Arc<Mutex<HashSet<String>>>,
    forecast_days: u32,
}

impl FetchContext {
    fn fetch(&self, city: &str) -> Result<(CurrentWeather, Forecast), WeatherError> {
        let current = self.source.fetch_current(city)?;
        let forecast = self.source.fetch_forecast(city, self.forecast_days)?;
        Ok((current, forecast))
    }

    fn run(&self, city: &str, origin: CityOrigin) -> FetchOutcome {
        let (current, forecast, outcome) = match self.fetch(city) {
            Ok((current, forecast)) => {
                tracing::debug!("Fetched live weather for {}", city);
                (current, forecast, FetchOutcome::Live)
            }
            Err(e) => {
                tracing::warn!("Fetch failed for {}: {}. Using generated data instead.", city, e);
                let (current, forecast) = fallback::generate(city, self.forecast_days);
                (current, forecast, FetchOutcome::Fallback)
            }
        };

        if origin == CityOrigin::Favorite && !self.favorites.contains(city) {
            tracing::debug!("{} is no longer a favorite, discarding result", city);
            return FetchOutcome::Discarded;
        }

        if self.store(city, current, forecast) {
            outcome
        } else {
            FetchOutcome::Discarded
        }
    }

    /// Write both partitions unless `city` has been removed.
    fn store(&self, city: &str, current: CurrentWeather, forecast: Forecast) -> bool {
        let removed = self.removed.lock();
        if removed.contains(city) {
            tracing::debug!("{} was removed while fetching, discarding result", city);
            return false;
        }
        self.cache.update_current(city, current);
        self.cache.update_forecast(city, forecast);
        true
    }

    fn write_fallback(&self, city: &str) -> FetchOutcome {
        let (current, forecast) = fallback::generate(city, self.forecast_days);
        if self.store(city, current, forecast) {
            FetchOutcome::Fallback
        } else {
            FetchOutcome::Discarded
        }
    }
}

pub struct Orchestrator {
    pool: Arc<TaskPool>,
    ctx: FetchContext,
    cache_file: Option<PathBuf>,
    state: Mutex<CycleState>,
    last_cycle_live: AtomicBool,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
}

impl Orchestrator {
    pub fn new(
        pool: Arc<TaskPool>,
        cache: Arc<WeatherCache>,
        favorites: Arc<FavoritesStore>,
        source: Arc<dyn WeatherSource>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pool,
            ctx: FetchContext {
                cache,
                favorites,
                source,
                removed: Arc::new(Mutex::new(HashSet::new())),
                forecast_days: config.forecast_days,
            },
            cache_file: config.cache_file,
            state: Mutex::new(CycleState::Idle),
            last_cycle_live: AtomicBool::new(false),
            last_success_at: Mutex::new(None),
        }
    }

    /// Fetch every tracked city once and wait for all of them.
    pub fn refresh_all(&self) -> Result<CycleReport, OrchestratorError> {
        {
            let mut state = self.state.lock();
            if !state.can_start_cycle() {
                return Err(OrchestratorError::CycleInProgress);
            }
            *state = state.on_cycle_start();
        }

        let result = self.run_cycle();

        {
            let mut state = self.state.lock();
            *state = state.on_cycle_done();
        }

        let report = result?;
        if !report.is_empty() {
            let live = report.succeeded();
            self.last_cycle_live.store(live, Ordering::Release);
            if live {
                *self.last_success_at.lock() = Some(Utc::now());
            } else {
                tracing::warn!(
                    "No live weather for any of {} cities; the weather service looks unreachable",
                    report.attempted()
                );
            }
        }

        self.persist_snapshot();
        Ok(report)
    }

    fn run_cycle(&self) -> Result<CycleReport, OrchestratorError> {
        let (cities, origin) = self.tracked_cities();
        tracing::info!("Refreshing weather for {} cities", cities.len());

        let mut pending = Vec::with_capacity(cities.len());
        for city in cities {
            let handle = self.submit_fetch(city.clone(), origin)?;
            pending.push((city, handle));
        }

        let mut report = CycleReport::default();
        for (city, handle) in pending {
            let outcome = match handle.join() {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Fetch task for {} failed: {}", city, e);
                    self.ctx.write_fallback(&city)
                }
            };
            report.record(city, outcome);
        }

        tracing::info!(
            "Refresh done: {} live, {} generated",
            report.live.len(),
            report.fallback.len()
        );
        Ok(report)
    }

    /// Favorites when there are any, otherwise every cached city that has
    /// not been removed.
    fn tracked_cities(&self) -> (Vec<String>, CityOrigin) {
        let favorites = self.ctx.favorites.list();
        if favorites.is_empty() {
            let cached = self.ctx.cache.list_cities();
            let removed = self.ctx.removed.lock();
            let known = cached.into_iter().filter(|c| !removed.contains(c)).collect();
            (known, CityOrigin::Known)
        } else {
            (favorites, CityOrigin::Favorite)
        }
    }

    fn submit_fetch(
        &self,
        city: String,
        origin: CityOrigin,
    ) -> Result<TaskHandle<FetchOutcome>, PoolError> {
        let ctx = self.ctx.clone();
        self.pool.submit(move || ctx.run(&city, origin))
    }

    /// Track `city` as a favorite and fetch it right away.
    pub fn add_city(&self, city: &str) -> Result<TaskHandle<FetchOutcome>, OrchestratorError> {
        if city.trim().is_empty() {
            return Err(OrchestratorError::EmptyCity);
        }

        self.ctx.removed.lock().remove(city);

        match self.ctx.favorites.add(city) {
            Ok(true) => tracing::info!("Added favorite city {}", city),
            Ok(false) => tracing::debug!("{} is already a favorite", city),
            Err(e) => tracing::warn!("Favorite {} added but not saved: {}", city, e),
        }

        Ok(self.submit_fetch(city.to_string(), CityOrigin::Favorite)?)
    }

    /// Stop tracking `city` and drop its cached data.
    ///
    /// A fetch for `city` still in flight will not write it back.
    pub fn remove_city(&self, city: &str) -> bool {
        self.ctx.removed.lock().insert(city.to_string());

        let was_favorite = match self.ctx.favorites.remove(city) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Favorite {} removed but not saved: {}", city, e);
                true
            }
        };
        let was_cached = self.ctx.cache.remove(city);

        if was_favorite || was_cached {
            tracing::info!("Removed city {}", city);
        }
        was_favorite || was_cached
    }

    /// Run `refresh_all` every `interval` on a background thread.
    pub fn start_periodic(self: &Arc<Self>, interval: Duration) -> RefreshTimer {
        let (stop_tx, stop_rx) = mpsc::channel();
        let orchestrator = Arc::clone(self);

        let handle = thread::Builder::new()
            .name("nimbus-refresh".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match orchestrator.refresh_all() {
                        Ok(_) => {}
                        Err(OrchestratorError::CycleInProgress) => {
                            tracing::debug!("Refresh already running, skipping timer tick");
                        }
                        Err(e) => {
                            tracing::error!("Periodic refresh stopped: {}", e);
                            break;
                        }
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                tracing::error!("Failed to start refresh timer: {}", e);
                None
            }
        };

        tracing::info!("Periodic refresh every {:?}", interval);
        RefreshTimer { stop_tx, handle }
    }

    /// Warm the cache from the snapshot file. Cities already cached are left
    /// alone. Returns how many cities were restored.
    pub fn restore_snapshot(&self) -> usize {
        let Some(path) = &self.cache_file else {
            return 0;
        };

        let entries = match legacy::read_snapshot(path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Could not read weather cache: {}", e);
                return 0;
            }
        };

        let mut restored = 0;
        for (city, entry) in entries {
            if self.ctx.cache.current(&city).is_some() {
                continue;
            }
            if let Some(current) = entry.current {
                self.ctx.cache.update_current(&city, current);
            }
            if let Some(forecast) = entry.forecast {
                self.ctx.cache.update_forecast(&city, forecast);
            }
            restored += 1;
        }

        tracing::info!("Restored {} cities from weather cache", restored);
        restored
    }

    fn persist_snapshot(&self) {
        let Some(path) = &self.cache_file else {
            return;
        };
        if let Err(e) = legacy::write_snapshot(path, &self.ctx.cache.snapshot()) {
            tracing::warn!("Could not save weather cache: {}", e);
        }
    }

    pub fn search_cities(&self, query: &str) -> Result<Vec<String>, WeatherError> {
        self.ctx.source.search_cities(query)
    }

    /// Cancel the source, drain the pool and save the cache.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down weather orchestrator");
        self.ctx.source.cancel();
        self.pool.shutdown();
        self.persist_snapshot();
    }

    /// Cities shown to the user: favorites, or the cache's cities if none.
    pub fn cities(&self) -> Vec<String> {
        self.tracked_cities().0
    }

    pub fn current(&self, city: &str) -> Option<CurrentWeather> {
        self.ctx.cache.current(city)
    }

    pub fn forecast(&self, city: &str) -> Option<Forecast> {
        self.ctx.cache.forecast(city)
    }

    pub fn data_status(&self, city: &str) -> DataStatus {
        if self.ctx.cache.current(city).is_none() {
            DataStatus::Missing
        } else if self.last_cycle_succeeded() {
            DataStatus::Live
        } else {
            DataStatus::Fallback
        }
    }

    pub fn last_cycle_succeeded(&self) -> bool {
        self.last_cycle_live.load(Ordering::Acquire)
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        *self.last_success_at.lock()
    }

    pub fn cycle_state(&self) -> CycleState {
        *self.state.lock()
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.ctx.favorites
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.ctx.cache
    }
}

/// Handle to the periodic refresh thread. Stops the thread when dropped.
pub struct RefreshTimer {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    /// Stop the timer, waiting for an in-flight cycle to finish.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Refresh timer thread panicked");
            }
        }
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.halt();
    }
}
