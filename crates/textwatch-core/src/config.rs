use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Default weather lookup endpoint (plain HTTP, as the provider serves it).
pub const DEFAULT_WEATHER_API_URL: &str = "http://api.openweathermap.org/data/2.1";

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

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Position acquisition settings
    #[serde(default)]
    pub location: LocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the weather lookup API (without the `/find/city` path)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Provider API key, sent as `appid` when present. When unset the
    /// `OWM_API_KEY` environment variable is read at startup instead.
    #[serde(default)]
    pub api_key: Option<String>,

    /// HTTP timeout for a weather fetch. Unset means the request may hang.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Send a "Weather Unavailable" message when a fetch fails instead of
    /// staying silent
    #[serde(default)]
    pub fallback_on_fetch_failure: bool,
}

fn default_api_url() -> String {
    DEFAULT_WEATHER_API_URL.to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            request_timeout_secs: None,
            fallback_on_fetch_failure: false,
        }
    }
}

impl WeatherConfig {
    /// API key from the file, else from `OWM_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref(), std::env::var(API_KEY_ENV).ok())
    }
}

/// Environment variable consulted when the file has no API key
pub const API_KEY_ENV: &str = "OWM_API_KEY";

/// A non-empty configured key wins over the environment value.
fn resolve_api_key(configured: Option<&str>, env: Option<String>) -> Option<String> {
    configured
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| env.filter(|k| !k.is_empty()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Give up on a position fix after this many milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// A cached fix younger than this is reused without a new read
    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,

    /// Poll interval of the continuous position watch
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,

    /// Fixed device latitude. Must be set together with `longitude`.
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Fixed device longitude. Must be set together with `latitude`.
    #[serde(default)]
    pub longitude: Option<f64>,
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_maximum_age_ms() -> u64 {
    60_000
}

fn default_watch_interval_secs() -> u64 {
    60
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            maximum_age_ms: default_maximum_age_ms(),
            watch_interval_secs: default_watch_interval_secs(),
            latitude: None,
            longitude: None,
        }
    }
}

impl LocationConfig {
    /// Configured coordinates, if both halves are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult), ConfigError> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
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

        self.validate_url(&self.weather.api_url, "weather.api_url", &mut result);

        if self.weather.resolved_api_key().is_none() {
            result.add_warning(
                "weather.api_key",
                "No API key configured - the provider may reject requests",
            );
        }

        if self.weather.request_timeout_secs == Some(0) {
            result.add_error("weather.request_timeout_secs", "Timeout must be greater than 0");
        }

        if self.location.timeout_ms == 0 {
            result.add_error("location.timeout_ms", "Timeout must be greater than 0");
        }

        if self.location.maximum_age_ms == 0 {
            result.add_warning(
                "location.maximum_age_ms",
                "Position cache disabled (0 ms) - every request reads a new fix",
            );
        }

        if self.location.watch_interval_secs == 0 {
            result.add_error(
                "location.watch_interval_secs",
                "Watch interval must be greater than 0",
            );
        }

        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    result.add_warning("location.latitude", "Latitude is outside -90..90");
                }
                if !(-180.0..=180.0).contains(&lon) {
                    result.add_warning("location.longitude", "Longitude is outside -180..180");
                }
            }
            (None, None) => {
                result.add_warning(
                    "location",
                    "No position configured - the device will see Location Unavailable",
                );
            }
            _ => {
                result.add_error(
                    "location",
                    "latitude and longitude must be set together",
                );
            }
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

    /// Save configuration to `path`
    ///
    /// Only file-sourced values are written; the environment API key never is.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Get the path to the default configuration file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("textwatch").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positioned() -> Config {
        let mut config = Config::default();
        config.weather.api_key = Some("key".into());
        config.location.latitude = Some(37.7749);
        config.location.longitude = Some(-122.4194);
        config
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_location_options() {
        let config = Config::default();
        assert_eq!(config.location.timeout_ms, 15_000);
        assert_eq!(config.location.maximum_age_ms, 60_000);
        assert_eq!(config.weather.api_url, DEFAULT_WEATHER_API_URL);
        assert!(!config.weather.fallback_on_fetch_failure);
    }

    #[test]
    fn test_fully_configured_has_no_warnings() {
        let result = positioned().validate();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = positioned();
        config.weather.api_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.api_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = positioned();
        config.weather.api_url = "ftp://api.example.com".to_string();
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = positioned();
        config.location.timeout_ms = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "location.timeout_ms"));
    }

    #[test]
    fn test_half_configured_position_is_error() {
        let mut config = positioned();
        config.location.longitude = None;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "location"));
        assert_eq!(config.location.coordinates(), None);
    }

    #[test]
    fn test_out_of_range_position_is_warning() {
        let mut config = positioned();
        config.location.latitude = Some(123.0);
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "location.latitude"));
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.location.watch_interval_secs, 60);
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[location]\nlatitude = 51.5\nlongitude = -0.12\n\n[weather]\nfallback_on_fetch_failure = true\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.location.coordinates(), Some((51.5, -0.12)));
        assert_eq!(config.location.timeout_ms, 15_000);
        assert!(config.weather.fallback_on_fetch_failure);
        assert_eq!(config.weather.api_url, DEFAULT_WEATHER_API_URL);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[location\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_validated_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[location]\nwatch_interval_secs = 0\n").unwrap();

        let err = Config::load_validated(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref s) if s.contains("watch_interval_secs")));
    }

    #[test]
    fn test_defaults_file_never_contains_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.weather.api_key, None);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("api_key"), "{}", written);
    }

    #[test]
    fn test_api_key_unset_in_both_file_shapes() {
        let dir = tempfile::tempdir().unwrap();

        let location_only = dir.path().join("location.toml");
        std::fs::write(&location_only, "[location]\nlatitude = 1.0\nlongitude = 2.0\n").unwrap();
        let weather_table = dir.path().join("weather.toml");
        std::fs::write(&weather_table, "[weather]\nfallback_on_fetch_failure = true\n").unwrap();

        for path in [location_only, weather_table] {
            let config = Config::load_from(&path).unwrap();
            assert_eq!(config.weather.api_key, None, "{}", path.display());
            assert_eq!(
                resolve_api_key(config.weather.api_key.as_deref(), Some("from-env".into())),
                Some("from-env".to_string())
            );
        }
    }

    #[test]
    fn test_file_api_key_wins_over_env() {
        assert_eq!(
            resolve_api_key(Some("from-file"), Some("from-env".into())),
            Some("from-file".to_string())
        );
        assert_eq!(
            resolve_api_key(Some(""), Some("from-env".into())),
            Some("from-env".to_string())
        );
        assert_eq!(resolve_api_key(None, Some(String::new())), None);
        assert_eq!(resolve_api_key(None, None), None);
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
