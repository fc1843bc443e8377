//! OpenWeatherMap client.
//!
//! `OpenWeatherClient` is the async reqwest client. `HttpWeatherSource` wraps
//! it for pool workers, driving each request to completion on a tokio runtime
//! handle from the calling (non-runtime) thread.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::instrument;

use crate::source::{CancelToken, SourceConfig, WeatherSource};
use crate::types::{
    Conditions, CurrentWeather, Forecast, ForecastEntry, WeatherCondition, WeatherError,
};

const USER_AGENT: &str = "Nimbus/0.1.0";
/// Provider forecast granularity is 3 hours
const STEPS_PER_DAY: u32 = 8;
const SEARCH_LIMIT: u32 = 5;

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    name: String,
    sys: ApiSys,
    main: ApiMain,
    wind: Option<ApiWind>,
    #[serde(default)]
    weather: Vec<ApiCondition>,
}

#[derive(Debug, Deserialize)]
struct ApiSys {
    #[serde(default)]
    country: String,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct ApiWind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    id: i32,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct ApiForecast {
    list: Vec<ApiForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastItem {
    dt: i64,
    main: ApiMain,
    wind: Option<ApiWind>,
    #[serde(default)]
    weather: Vec<ApiCondition>,
}

#[derive(Debug, Deserialize)]
struct ApiGeoCity {
    name: String,
    #[serde(default)]
    country: String,
}

fn conditions(weather: &[ApiCondition]) -> Conditions {
    match weather.first() {
        Some(w) => Conditions {
            category: WeatherCondition::from_code(w.id),
            description: w.description.clone(),
            icon: w.icon.clone(),
        },
        None => Conditions {
            category: WeatherCondition::Clear,
            description: String::new(),
            icon: WeatherCondition::Clear.icon_code().to_string(),
        },
    }
}

fn humidity(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

fn wind(wind: Option<&ApiWind>) -> (f64, f64) {
    wind.map(|w| (w.speed, w.deg)).unwrap_or((0.0, 0.0))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, WeatherError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| WeatherError::Parse(format!("Invalid timestamp: {}", secs)))
}

impl ApiCurrent {
    fn into_current(self) -> CurrentWeather {
        let (wind_speed, wind_deg) = wind(self.wind.as_ref());
        CurrentWeather {
            city: self.name,
            country: self.sys.country,
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            temp_min: self.main.temp_min,
            temp_max: self.main.temp_max,
            pressure: self.main.pressure,
            humidity: humidity(self.main.humidity),
            wind_speed,
            wind_deg,
            conditions: conditions(&self.weather),
            sunrise: self.sys.sunrise.and_then(|s| DateTime::from_timestamp(s, 0)),
            sunset: self.sys.sunset.and_then(|s| DateTime::from_timestamp(s, 0)),
            updated_at: Utc::now(),
        }
    }
}

impl ApiForecastItem {
    fn into_entry(self) -> Result<ForecastEntry, WeatherError> {
        let (wind_speed, wind_deg) = wind(self.wind.as_ref());
        Ok(ForecastEntry {
            time: timestamp(self.dt)?,
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            temp_min: self.main.temp_min,
            temp_max: self.main.temp_max,
            pressure: self.main.pressure,
            humidity: humidity(self.main.humidity),
            wind_speed,
            wind_deg,
            conditions: conditions(&self.weather),
        })
    }
}

/// Async client for the current-weather, forecast and geocoding endpoints.
#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    config: RwLock<Arc<SourceConfig>>,
    cancel: CancelToken,
}

impl OpenWeatherClient {
    pub fn new(config: SourceConfig) -> Result<Self, WeatherError> {
        Self::with_cancel_token(config, CancelToken::new())
    }

    pub fn with_cancel_token(config: SourceConfig, cancel: CancelToken) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            config: RwLock::new(Arc::new(config)),
            cancel,
        })
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<SourceConfig> {
        self.config.read().clone()
    }

    /// Swap in a new configuration. In-flight requests keep the old one.
    pub fn replace_config(&self, config: SourceConfig) {
        *self.config.write() = Arc::new(config);
        tracing::info!("Weather source configuration replaced");
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn current(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        let config = self.begin()?;
        let url = format!(
            "{}/weather?q={}&appid={}&units=metric",
            config.base_url,
            urlencoding::encode(city),
            urlencoding::encode(&config.api_key),
        );

        let body: ApiCurrent = self.get_json(&url, &config, city).await?;
        Ok(body.into_current())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn forecast(&self, city: &str, days: u32) -> Result<Forecast, WeatherError> {
        let config = self.begin()?;
        let url = format!(
            "{}/forecast?q={}&cnt={}&appid={}&units=metric",
            config.base_url,
            urlencoding::encode(city),
            days.saturating_mul(STEPS_PER_DAY),
            urlencoding::encode(&config.api_key),
        );

        let body: ApiForecast = self.get_json(&url, &config, city).await?;
        let mut entries = body
            .list
            .into_iter()
            .map(ApiForecastItem::into_entry)
            .collect::<Result<Forecast, _>>()?;
        entries.sort_by_key(|e| e.time);
        Ok(entries)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn search(&self, query: &str) -> Result<Vec<String>, WeatherError> {
        let config = self.begin()?;
        let url = format!(
            "{}/direct?q={}&limit={}&appid={}",
            config.geo_url,
            urlencoding::encode(query),
            SEARCH_LIMIT,
            urlencoding::encode(&config.api_key),
        );

        let body: Vec<ApiGeoCity> = self.get_json(&url, &config, query).await?;
        Ok(body
            .into_iter()
            .map(|c| {
                if c.country.is_empty() {
                    c.name
                } else {
                    format!("{}, {}", c.name, c.country)
                }
            })
            .collect())
    }

    /// Cancellation check plus a consistent config snapshot for one request.
    fn begin(&self) -> Result<Arc<SourceConfig>, WeatherError> {
        self.cancel.check()?;
        Ok(self.config())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        config: &SourceConfig,
        subject: &str,
    ) -> Result<T, WeatherError> {
        let response = self
            .client
            .get(url)
            .timeout(config.timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(WeatherError::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            tracing::debug!("Weather request for {} returned status {}", subject, status);
            return Err(WeatherError::RemoteRejected {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| WeatherError::Parse(e.to_string()))
    }
}

/// [`WeatherSource`] backed by [`OpenWeatherClient`].
///
/// Calls block the current thread until the request completes, so they must
/// come from outside the runtime's async context (pool workers, timer
/// threads, `spawn_blocking`).
#[derive(Debug)]
pub struct HttpWeatherSource {
    client: OpenWeatherClient,
    runtime: Handle,
}

impl HttpWeatherSource {
    pub fn new(client: OpenWeatherClient, runtime: Handle) -> Self {
        Self { client, runtime }
    }

    pub fn client(&self) -> &OpenWeatherClient {
        &self.client
    }
}

impl WeatherSource for HttpWeatherSource {
    fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        self.runtime.block_on(self.client.current(city))
    }

    fn fetch_forecast(&self, city: &str, days: u32) -> Result<Forecast, WeatherError> {
        self.runtime.block_on(self.client.forecast(city, days))
    }

    fn search_cities(&self, query: &str) -> Result<Vec<String>, WeatherError> {
        self.runtime.block_on(self.client.search(query))
    }

    fn cancel(&self) {
        self.client.cancel_token().cancel();
        tracing::info!("Weather source cancelled");
    }

    fn is_cancelled(&self) -> bool {
        self.client.cancel_token().is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_from_first_entry() {
        let weather = vec![
            ApiCondition {
                id: 501,
                description: "moderate rain".to_string(),
                icon: "10n".to_string(),
            },
            ApiCondition {
                id: 701,
                description: "mist".to_string(),
                icon: "50n".to_string(),
            },
        ];
        let c = conditions(&weather);
        assert_eq!(c.category, WeatherCondition::Rain);
        assert_eq!(c.description, "moderate rain");
        assert_eq!(c.icon, "10n");
    }

    #[test]
    fn test_conditions_empty_defaults_to_clear() {
        let c = conditions(&[]);
        assert_eq!(c.category, WeatherCondition::Clear);
        assert!(c.description.is_empty());
    }

    #[test]
    fn test_humidity_clamped() {
        assert_eq!(humidity(55.4), 55);
        assert_eq!(humidity(130.0), 100);
        assert_eq!(humidity(-3.0), 0);
    }

    #[test]
    fn test_parse_current_payload() {
        let json = r#"{
            "name": "Paris",
            "sys": {"country": "FR", "sunrise": 1700000000, "sunset": 1700040000},
            "main": {"temp": 12.5, "feels_like": 11.0, "temp_min": 10.0, "temp_max": 14.0,
                     "pressure": 1015, "humidity": 70},
            "wind": {"speed": 4.1, "deg": 250},
            "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}]
        }"#;
        let api: ApiCurrent = serde_json::from_str(json).unwrap();
        let current = api.into_current();

        assert_eq!(current.city, "Paris");
        assert_eq!(current.country, "FR");
        assert_eq!(current.temperature, 12.5);
        assert_eq!(current.humidity, 70);
        assert_eq!(current.wind_deg, 250.0);
        assert_eq!(current.conditions.category, WeatherCondition::Clouds);
        assert_eq!(current.sunrise.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_missing_wind_is_calm() {
        let json = r#"{
            "name": "Oslo",
            "sys": {},
            "main": {"temp": 1.0, "feels_like": -2.0, "temp_min": 0.0, "temp_max": 2.0,
                     "pressure": 1000, "humidity": 80}
        }"#;
        let api: ApiCurrent = serde_json::from_str(json).unwrap();
        let current = api.into_current();
        assert_eq!(current.wind_speed, 0.0);
        assert!(current.sunrise.is_none());
        assert!(current.country.is_empty());
    }
}
