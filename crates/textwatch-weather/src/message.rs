//! Messages exchanged with the paired watch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::types::WeatherResult;

pub const LOCATION_UNAVAILABLE: &str = "Location Unavailable";
pub const WEATHER_UNAVAILABLE: &str = "Weather Unavailable";
pub const TEMPERATURE_UNAVAILABLE: &str = "N/A";

/// A single dictionary value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageValue {
    Int(i32),
    Str(String),
}

impl From<i32> for MessageValue {
    fn from(v: i32) -> Self {
        MessageValue::Int(v)
    }
}

impl From<&str> for MessageValue {
    fn from(v: &str) -> Self {
        MessageValue::Str(v.to_string())
    }
}

impl From<String> for MessageValue {
    fn from(v: String) -> Self {
        MessageValue::Str(v)
    }
}

/// Numeric dictionary keys as declared by the watch app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMessageKey {
    Fetch = 1,
    Temperature = 2,
    City = 3,
}

impl AppMessageKey {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Temperature => "temperature",
            Self::City => "city",
        }
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "fetch" => Some(Self::Fetch),
            "temperature" => Some(Self::Temperature),
            "city" => Some(Self::City),
            _ => None,
        }
    }
}

/// Flat string-keyed message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppMessage(BTreeMap<String, MessageValue>);

impl AppMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: AppMessageKey, value: impl Into<MessageValue>) -> Self {
        self.0.insert(key.name().to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&MessageValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is the watch's periodic weather request.
    pub fn is_fetch_request(&self) -> bool {
        self.0.contains_key(AppMessageKey::Fetch.name())
            || self.0.contains_key(&AppMessageKey::Fetch.id().to_string())
    }

    /// Dictionary with the watch's numeric keys. Unknown keys are dropped.
    pub fn to_keyed(&self) -> BTreeMap<u32, MessageValue> {
        self.0
            .iter()
            .filter_map(|(k, v)| AppMessageKey::from_name(k).map(|key| (key.id(), v.clone())))
            .collect()
    }
}

impl From<BTreeMap<String, MessageValue>> for AppMessage {
    fn from(map: BTreeMap<String, MessageValue>) -> Self {
        Self(map)
    }
}

/// What the bridge tells the device at the end of a fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Weather(WeatherResult),
    LocationUnavailable,
    WeatherUnavailable,
}

impl OutboundMessage {
    pub fn to_app_message(&self) -> AppMessage {
        let (temperature, city): (MessageValue, &str) = match self {
            Self::Weather(w) => (w.temperature.into(), w.city.as_str()),
            Self::LocationUnavailable => (TEMPERATURE_UNAVAILABLE.into(), LOCATION_UNAVAILABLE),
            Self::WeatherUnavailable => (TEMPERATURE_UNAVAILABLE.into(), WEATHER_UNAVAILABLE),
        };
        AppMessage::new()
            .with(AppMessageKey::Temperature, temperature)
            .with(AppMessageKey::City, city)
    }
}

/// Event delivered by the device host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Companion started, fired once.
    Ready,
    /// Inbound message from the watch. The payload is not interpreted.
    AppMessage(AppMessage),
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Device channel closed")]
    ChannelClosed,
    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound device messaging. Fire-and-forget: no delivery confirmation.
pub trait MessageSender: Send + Sync {
    fn send(&self, message: AppMessage) -> Result<(), MessagingError>;
}

/// Sends into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<AppMessage>,
}

impl ChannelSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSender for ChannelSender {
    fn send(&self, message: AppMessage) -> Result<(), MessagingError> {
        self.tx.send(message).map_err(|_| MessagingError::ChannelClosed)
    }
}

/// Writer task for a [`ChannelSender`]: each message becomes one JSON object
/// per line on `out`.
///
/// Runs until every sender is dropped, then returns the writer.
pub async fn write_json_lines<W>(
    mut messages: mpsc::UnboundedReceiver<AppMessage>,
    mut out: W,
) -> Result<W, MessagingError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = messages.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(out)
}
