//! In-memory weather cache shared between fetch tasks and readers.
//!
//! Current conditions and forecasts live in two separately locked maps, so a
//! forecast write never contends with a current-weather read, even for the
//! same city. Readers always get clones.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::types::{CurrentWeather, Forecast};

/// Everything cached for one city at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    pub current: Option<CurrentWeather>,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Default)]
pub struct WeatherCache {
    current: RwLock<HashMap<String, CurrentWeather>>,
    forecasts: RwLock<HashMap<String, Forecast>>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current weather for `city`.
    pub fn update_current(&self, city: &str, value: CurrentWeather) {
        self.current.write().insert(city.to_string(), value);
    }

    /// Replace the forecast for `city`.
    pub fn update_forecast(&self, city: &str, value: Forecast) {
        self.forecasts.write().insert(city.to_string(), value);
    }

    pub fn current(&self, city: &str) -> Option<CurrentWeather> {
        self.current.read().get(city).cloned()
    }

    pub fn forecast(&self, city: &str) -> Option<Forecast> {
        self.forecasts.read().get(city).cloned()
    }

    /// Snapshot of every city with at least one cached value.
    pub fn list_cities(&self) -> BTreeSet<String> {
        let mut cities: BTreeSet<String> = self.current.read().keys().cloned().collect();
        cities.extend(self.forecasts.read().keys().cloned());
        cities
    }

    /// Drop both the current weather and the forecast for `city`.
    ///
    /// Both partitions are held for the duration so no reader sees a forecast
    /// without its city.
    pub fn remove(&self, city: &str) -> bool {
        let mut current = self.current.write();
        let mut forecasts = self.forecasts.write();
        let had_current = current.remove(city).is_some();
        let had_forecast = forecasts.remove(city).is_some();
        had_current || had_forecast
    }

    pub fn clear(&self) {
        let mut current = self.current.write();
        let mut forecasts = self.forecasts.write();
        current.clear();
        forecasts.clear();
    }

    /// Consistent copy of the whole cache, ordered by city.
    pub fn snapshot(&self) -> Vec<(String, CacheEntry)> {
        let current = self.current.read();
        let forecasts = self.forecasts.read();

        let cities: BTreeSet<&String> = current.keys().chain(forecasts.keys()).collect();
        cities
            .into_iter()
            .map(|city| {
                let entry = CacheEntry {
                    current: current.get(city).cloned(),
                    forecast: forecasts.get(city).cloned(),
                };
                (city.clone(), entry)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.list_cities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty() && self.forecasts.read().is_empty()
    }
}
