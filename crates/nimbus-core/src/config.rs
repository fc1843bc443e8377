use crate::error::ConfigError;
use nimbus_weather::source::{DEFAULT_BASE_URL, DEFAULT_GEO_URL, PLACEHOLDER_API_KEY};
use nimbus_weather::{OrchestratorConfig, SourceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const CONFIG_FILE: &str = "config.toml";
const FAVORITES_FILE: &str = "favorites.txt";
const CACHE_FILE: &str = "weather_cache.txt";
const API_KEY_FILE: &str = "api_key.txt";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather settings
    #[serde(default)]
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Current weather and forecast endpoint root
    pub api_base_url: String,

    /// Geocoding endpoint root used for city search
    pub geo_base_url: String,

    /// File holding the API key on its first line.
    /// Defaults to `api_key.txt` in the config directory.
    pub api_key_file: Option<PathBuf>,

    /// Refresh interval in minutes (0 disables periodic refresh)
    pub refresh_minutes: u32,

    /// Days of forecast requested per city
    pub forecast_days: u32,

    /// Size of the fetch worker pool
    pub worker_threads: usize,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Cities tracked when the favorites file is empty
    pub default_cities: Vec<String>,

    /// Defaults to `favorites.txt` in the config directory
    pub favorites_file: Option<PathBuf>,

    /// Defaults to `weather_cache.txt` in the config directory
    pub cache_file: Option<PathBuf>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            geo_base_url: DEFAULT_GEO_URL.to_string(),
            api_key_file: None,
            refresh_minutes: 5,
            forecast_days: 5,
            worker_threads: 4,
            request_timeout_secs: 5,
            default_cities: vec![
                "Tel Aviv".to_string(),
                "Jerusalem".to_string(),
                "Haifa".to_string(),
            ],
            favorites_file: None,
            cache_file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self::with_dir(config_dir)
    }
}

impl Config {
    /// Default settings rooted at `config_dir`
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            weather: WeatherConfig::default(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let config = Self::with_dir(dir);
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult), ConfigError> {
        Self::validated(Self::load()?)
    }

    /// Like [`Config::load_validated`] for an explicit file
    pub fn load_validated_from(path: &Path) -> Result<(Self, ValidationResult), ConfigError> {
        Self::validated(Self::load_from(path)?)
    }

    fn validated(config: Self) -> Result<(Self, ValidationResult), ConfigError> {
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let weather = &self.weather;

        self.validate_url(&weather.api_base_url, "weather.api_base_url", &mut result);
        self.validate_url(&weather.geo_base_url, "weather.geo_base_url", &mut result);

        if weather.worker_threads == 0 {
            result.add_error("weather.worker_threads", "At least one worker thread is required");
        } else if weather.worker_threads > 64 {
            result.add_warning(
                "weather.worker_threads",
                "Worker pool is unusually large (>64)",
            );
        }

        if weather.refresh_minutes == 0 {
            result.add_warning(
                "weather.refresh_minutes",
                "Weather refresh disabled (0 minutes)",
            );
        } else if weather.refresh_minutes > 1440 {
            result.add_warning(
                "weather.refresh_minutes",
                "Weather refresh interval is more than 24 hours",
            );
        }

        if weather.forecast_days == 0 || weather.forecast_days > 5 {
            result.add_warning(
                "weather.forecast_days",
                "The weather service provides between 1 and 5 days of forecast",
            );
        }

        if weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        if weather.default_cities.iter().any(|c| c.trim().is_empty()) {
            result.add_error("weather.default_cities", "City names cannot be empty");
        }

        if self.load_api_key() == PLACEHOLDER_API_KEY {
            result.add_warning(
                "weather.api_key_file",
                format!(
                    "No API key in {} - generated weather will be shown",
                    self.api_key_path().display()
                ),
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&self.config_dir.join(CONFIG_FILE))
    }

    fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        write_file(path, &contents)
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("nimbus");

        Ok(config_dir.join(CONFIG_FILE))
    }

    pub fn api_key_path(&self) -> PathBuf {
        self.resolve(self.weather.api_key_file.as_deref(), API_KEY_FILE)
    }

    pub fn favorites_path(&self) -> PathBuf {
        self.resolve(self.weather.favorites_file.as_deref(), FAVORITES_FILE)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.resolve(self.weather.cache_file.as_deref(), CACHE_FILE)
    }

    /// Relative paths are taken from the config directory
    fn resolve(&self, configured: Option<&Path>, default_name: &str) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.config_dir.join(path),
            None => self.config_dir.join(default_name),
        }
    }

    /// First line of the API key file, or the placeholder key when the file
    /// is missing or blank.
    pub fn load_api_key(&self) -> String {
        let path = self.api_key_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match contents.lines().next().map(str::trim) {
                Some(key) if !key.is_empty() => key.to_string(),
                _ => PLACEHOLDER_API_KEY.to_string(),
            },
            Err(e) => {
                tracing::debug!("No API key at {}: {}", path.display(), e);
                PLACEHOLDER_API_KEY.to_string()
            }
        }
    }

    /// Write `key` to the API key file, replacing any previous key.
    pub fn save_api_key(&self, key: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingSetting("weather API key".to_string()));
        }

        let path = self.api_key_path();
        write_file(&path, &format!("{}\n", key))?;
        tracing::info!("Saved API key to {}", path.display());
        Ok(())
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            base_url: self.weather.api_base_url.trim_end_matches('/').to_string(),
            geo_url: self.weather.geo_base_url.trim_end_matches('/').to_string(),
            api_key: self.load_api_key(),
            timeout: Duration::from_secs(self.weather.request_timeout_secs),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            forecast_days: self.weather.forecast_days,
            cache_file: Some(self.cache_path()),
        }
    }

    /// Periodic refresh interval, `None` when disabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.weather.refresh_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(u64::from(minutes) * 60)),
        }
    }
}

/// Write `contents` to `path`, creating parent directories.
fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, contents).map_err(io_err)
}
