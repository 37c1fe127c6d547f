//! Weather bridge for Textwatch
//!
//! Watches the device position, looks up current weather via the
//! OpenWeatherMap `find/city` endpoint and forwards temperature and city
//! name to the paired watch.

pub mod bridge;
pub mod location;
pub mod message;
pub mod provider;
pub mod types;

pub use bridge::{BridgeTask, FetchFailurePolicy, FetchOutcome, WeatherBridge};
pub use location::{FixedPositionSource, Geolocation, LocationProvider, PositionSource, PositionWatch};
pub use message::{
    write_json_lines, AppMessage, AppMessageKey, ChannelSender, DeviceEvent, MessageSender,
    MessageValue, MessagingError, OutboundMessage,
};
pub use provider::{OpenWeatherMapProvider, WeatherSource};
pub use types::*;
