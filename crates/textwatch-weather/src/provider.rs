//! Weather lookup against the OpenWeatherMap `find/city` endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use crate::types::{WeatherError, WeatherResult};

/// Source of current weather for a coordinate pair.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Look up the weather nearest to `(latitude, longitude)`.
    ///
    /// `Ok(None)` means the provider answered but had no usable match.
    async fn current_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<WeatherResult>, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    list: Option<Vec<FindEntry>>,
}

#[derive(Debug, Deserialize)]
struct FindEntry {
    main: Option<MainBlock>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    /// Kelvin
    temp: Option<f64>,
}

impl FindResponse {
    /// First list entry, if it carries both a temperature and a non-empty name.
    fn into_result(self) -> Option<WeatherResult> {
        let entry = self.list?.into_iter().next()?;
        let kelvin = entry.main.and_then(|m| m.temp);
        let name = entry.name.filter(|n| !n.is_empty());

        match (kelvin, name) {
            (Some(kelvin), Some(name)) => Some(WeatherResult::from_kelvin(kelvin, name)),
            (kelvin, name) => {
                tracing::warn!(
                    has_temp = kelvin.is_some(),
                    has_name = name.is_some(),
                    "First weather entry is incomplete"
                );
                None
            }
        }
    }
}

/// HTTP client for the provider.
#[derive(Debug, Clone)]
pub struct OpenWeatherMapProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherMapProvider {
    /// Create a provider. With `timeout` unset a stalled request never resolves.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, WeatherError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Full request URL for a coordinate pair.
    pub fn request_url(&self, latitude: f64, longitude: f64) -> String {
        let mut url = format!(
            "{}/find/city?lat={}&lon={}&cnt=1",
            self.base_url, latitude, longitude
        );
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&appid={}", key));
        }
        url
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherMapProvider {
    #[instrument(skip(self), level = "debug")]
    async fn current_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<WeatherResult>, WeatherError> {
        let response = self
            .client
            .get(self.request_url(latitude, longitude))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(WeatherError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: FindResponse = serde_json::from_str(&body)
            .map_err(|e| WeatherError::Parse(format!("JSON parse error: {}", e)))?;

        Ok(parsed.into_result())
    }
}
