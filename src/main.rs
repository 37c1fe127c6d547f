use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use textwatch_core::{AppError, Config};
use textwatch_weather::{
    write_json_lines, AppMessage, ChannelSender, DeviceEvent, FetchFailurePolicy,
    FixedPositionSource, Geolocation, LocationOptions, OpenWeatherMapProvider, WeatherBridge,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Companion host: stdin lines are inbound watch messages, stdout lines are
/// outbound ones.
#[tokio::main]
async fn main() -> Result<()> {
    textwatch_core::init()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Err(e) = run(config_path).await {
        tracing::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}

async fn run(config_path: Option<PathBuf>) -> Result<(), AppError> {
    let (config, _) = Config::load_validated(config_path.as_deref())?;

    let provider = OpenWeatherMapProvider::new(
        &config.weather.api_url,
        config.weather.resolved_api_key(),
        config.weather.request_timeout_secs.map(Duration::from_secs),
    )
    .map_err(AppError::service)?;

    let location = Geolocation::new(
        FixedPositionSource::new(config.location.coordinates()),
        Duration::from_secs(config.location.watch_interval_secs),
    );

    let (sender, outbound) = ChannelSender::channel();
    let writer = tokio::spawn(write_json_lines(outbound, tokio::io::stdout()));

    let bridge = WeatherBridge::new(Arc::new(location), Arc::new(provider), Arc::new(sender))
        .with_options(LocationOptions::from_millis(
            config.location.timeout_ms,
            config.location.maximum_age_ms,
        ))
        .with_failure_policy(FetchFailurePolicy::from_fallback_flag(
            config.weather.fallback_on_fetch_failure,
        ));

    let (events_tx, events_rx) = mpsc::channel(32);
    let bridge_task = tokio::spawn(bridge.run(events_rx));

    tracing::info!("Textwatch bridge started");
    events_tx
        .send(DeviceEvent::Ready)
        .await
        .map_err(|_| AppError::service("bridge stopped before ready"))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if events_tx
            .send(DeviceEvent::AppMessage(parse_inbound(&line)))
            .await
            .is_err()
        {
            break;
        }
    }

    drop(events_tx);
    bridge_task.await.map_err(AppError::service)?;

    // The bridge dropped the last sender, so the writer ends once flushed.
    writer
        .await
        .map_err(AppError::service)?
        .map_err(AppError::service)?;
    tracing::info!("Textwatch bridge stopped");
    Ok(())
}

/// Inbound payloads only trigger a fetch, so anything unreadable becomes an empty message.
fn parse_inbound(line: &str) -> AppMessage {
    let line = line.trim();
    if line.is_empty() {
        return AppMessage::new();
    }

    serde_json::from_str(line).unwrap_or_else(|e| {
        tracing::debug!("Inbound message is not a JSON dictionary: {}", e);
        AppMessage::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound_dictionary() {
        let msg = parse_inbound(r#"{"fetch": 1}"#);
        assert!(msg.is_fetch_request());
    }

    #[test]
    fn test_parse_inbound_garbage_is_empty() {
        assert!(parse_inbound("ping").is_empty());
        assert!(parse_inbound("   ").is_empty());
        assert!(parse_inbound("[1, 2]").is_empty());
    }
}
