use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weather condition categories mapped from provider condition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    Clouds,
    Drizzle,
    Rain,
    Thunderstorm,
    Snow,
    Mist,
}

impl WeatherCondition {
    /// Convert a provider condition id to a WeatherCondition
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_code(code: i32) -> Self {
        match code {
            200..=299 => Self::Thunderstorm,
            300..=399 => Self::Drizzle,
            500..=599 => Self::Rain,
            600..=699 => Self::Snow,
            700..=799 => Self::Mist, // Atmosphere group: mist, smoke, haze, fog...
            800 => Self::Clear,
            801..=804 => Self::Clouds,
            _ => Self::Clear, // Unknown codes default to clear
        }
    }

    /// Best-effort category for free-form text such as "Shower rain".
    pub fn from_text(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("thunder") {
            Self::Thunderstorm
        } else if text.contains("drizzle") {
            Self::Drizzle
        } else if text.contains("rain") {
            Self::Rain
        } else if text.contains("snow") || text.contains("sleet") {
            Self::Snow
        } else if text.contains("mist") || text.contains("fog") || text.contains("haze") {
            Self::Mist
        } else if text.contains("cloud") {
            Self::Clouds
        } else {
            Self::Clear
        }
    }

    /// Get the provider's group label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Thunderstorm => "Thunderstorm",
            Self::Snow => "Snow",
            Self::Mist => "Mist",
        }
    }

    /// Default daytime icon code for the category
    pub fn icon_code(&self) -> &'static str {
        match self {
            Self::Clear => "01d",
            Self::Clouds => "03d",
            Self::Drizzle => "09d",
            Self::Rain => "10d",
            Self::Thunderstorm => "11d",
            Self::Snow => "13d",
            Self::Mist => "50d",
        }
    }
}

/// Condition category plus the provider's own wording and icon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub category: WeatherCondition,
    pub description: String,
    pub icon: String,
}

impl Conditions {
    /// Build conditions from a description alone, inferring category and icon.
    pub fn from_description(description: impl Into<String>) -> Self {
        let description = description.into();
        let category = WeatherCondition::from_text(&description);
        Self {
            category,
            description,
            icon: category.icon_code().to_string(),
        }
    }
}

/// Current weather conditions for one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub city: String,
    pub country: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_deg: f64,
    pub conditions: Conditions,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One step of a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_deg: f64,
    pub conditions: Conditions,
}

/// Chronological forecast steps, typically 3 hours apart
pub type Forecast = Vec<ForecastEntry>;

/// Weather source errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Remote rejected request with status {status}")]
    RemoteRejected { status: u16 },
    #[error("City not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Weather source cancelled")]
    Cancelled,
}

impl WeatherError {
    /// True for failures caused by the response body rather than the exchange.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::RemoteRejected {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// File persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_thunderstorm() {
        assert_eq!(WeatherCondition::from_code(200), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_code(232), WeatherCondition::Thunderstorm);
    }

    #[test]
    fn test_code_drizzle() {
        assert_eq!(WeatherCondition::from_code(300), WeatherCondition::Drizzle);
        assert_eq!(WeatherCondition::from_code(321), WeatherCondition::Drizzle);
    }

    #[test]
    fn test_code_rain() {
        assert_eq!(WeatherCondition::from_code(500), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_code(531), WeatherCondition::Rain);
    }

    #[test]
    fn test_code_snow() {
        assert_eq!(WeatherCondition::from_code(600), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::from_code(622), WeatherCondition::Snow);
    }

    #[test]
    fn test_code_atmosphere_is_mist() {
        assert_eq!(WeatherCondition::from_code(701), WeatherCondition::Mist);
        assert_eq!(WeatherCondition::from_code(741), WeatherCondition::Mist);
    }

    #[test]
    fn test_code_clear_and_clouds() {
        assert_eq!(WeatherCondition::from_code(800), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_code(801), WeatherCondition::Clouds);
        assert_eq!(WeatherCondition::from_code(804), WeatherCondition::Clouds);
    }

    #[test]
    fn test_code_unknown_defaults_to_clear() {
        assert_eq!(WeatherCondition::from_code(999), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_code(-1), WeatherCondition::Clear);
    }

    #[test]
    fn test_from_text() {
        assert_eq!(WeatherCondition::from_text("Shower rain"), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_text("Broken clouds"), WeatherCondition::Clouds);
        assert_eq!(WeatherCondition::from_text("Thunderstorm"), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_text("Mist"), WeatherCondition::Mist);
        assert_eq!(WeatherCondition::from_text("Clear sky"), WeatherCondition::Clear);
    }

    #[test]
    fn test_conditions_from_description() {
        let c = Conditions::from_description("Snow");
        assert_eq!(c.category, WeatherCondition::Snow);
        assert_eq!(c.icon, "13d");
        assert_eq!(c.description, "Snow");
    }

    #[test]
    fn test_parse_error_is_distinguished() {
        assert!(WeatherError::Parse("missing main".into()).is_parse());
        assert!(!WeatherError::Transport("refused".into()).is_parse());
        assert!(!WeatherError::RemoteRejected { status: 500 }.is_parse());
    }
}
