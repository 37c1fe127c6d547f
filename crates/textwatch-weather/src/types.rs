use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Offset between Kelvin and degrees Celsius
pub const KELVIN_OFFSET: f64 = 273.15;

/// A geolocation fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// When the fix was acquired
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// A fix acquired now
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: Utc::now(),
        }
    }

    /// Time elapsed since the fix was acquired. Fixes stamped in the future count as fresh.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Simplified current weather, as forwarded to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherResult {
    /// Degrees Celsius, rounded
    pub temperature: i32,
    /// Name of the matched location, never empty
    pub city: String,
}

impl WeatherResult {
    /// Build a result from a provider temperature in Kelvin
    pub fn from_kelvin(kelvin: f64, city: impl Into<String>) -> Self {
        Self {
            temperature: kelvin_to_celsius(kelvin),
            city: city.into(),
        }
    }
}

/// Convert Kelvin to whole degrees Celsius.
///
/// Halves round towards positive infinity: 0.5 becomes 1, -0.5 becomes 0.
pub fn kelvin_to_celsius(kelvin: f64) -> i32 {
    (kelvin - KELVIN_OFFSET + 0.5).floor() as i32
}

/// Options for a position request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationOptions {
    /// Give up on acquiring a fix after this long
    pub timeout: Duration,
    /// Accept a cached fix no older than this
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(15_000),
            maximum_age: Duration::from_millis(60_000),
        }
    }
}

impl LocationOptions {
    pub fn from_millis(timeout_ms: u64, maximum_age_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            maximum_age: Duration::from_millis(maximum_age_ms),
        }
    }
}

/// Location service errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location error: {0}")]
    Other(String),
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected status: {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}
