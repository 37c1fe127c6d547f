//! The weather bridge: position → weather lookup → device message.
//!
//! Each trigger (a watch update or an inbound device message) runs as its own
//! task. Cycles share no mutable state, so concurrent triggers may finish in
//! any order and every one of them produces its own outbound message.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::location::LocationProvider;
use crate::message::{DeviceEvent, MessageSender, OutboundMessage};
use crate::provider::WeatherSource;
use crate::types::{LocationError, LocationOptions, Position, WeatherResult};

/// What to tell the device when the weather lookup itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchFailurePolicy {
    /// Send nothing. The failure is only logged.
    #[default]
    Silent,
    /// Send a "Weather Unavailable" message.
    Fallback,
}

impl FetchFailurePolicy {
    pub fn from_fallback_flag(fallback: bool) -> Self {
        if fallback {
            Self::Fallback
        } else {
            Self::Silent
        }
    }
}

/// Handle to work started by the bridge: a position watch or a one-shot cycle.
///
/// Dropping the handle stops a watch without waiting for it. Use
/// [`BridgeTask::finish`] to stop it and wait for everything it spawned.
#[derive(Debug)]
pub struct BridgeTask {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BridgeTask {
    /// Ask a watch to stop taking updates. One-shot cycles ignore this.
    pub fn request_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Stop the task and wait until its cycles have delivered.
    pub async fn finish(mut self) {
        self.request_stop();
        if let Err(e) = self.task.await {
            tracing::warn!("Bridge task did not complete: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn log_cycle_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        tracing::warn!("Fetch cycle did not complete: {}", e);
    }
}

/// How a single fetch cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Weather was found and sent to the device.
    Sent(WeatherResult),
    /// No position; the fallback message was sent.
    LocationUnavailable,
    /// The provider answered 200 without a usable entry.
    NoResult,
    /// Network error, non-200 status or an undecodable body.
    Failed,
}

#[derive(Clone)]
pub struct WeatherBridge {
    location: Arc<dyn LocationProvider>,
    weather: Arc<dyn WeatherSource>,
    sender: Arc<dyn MessageSender>,
    options: LocationOptions,
    failure_policy: FetchFailurePolicy,
}

impl WeatherBridge {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        weather: Arc<dyn WeatherSource>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            location,
            weather,
            sender,
            options: LocationOptions::default(),
            failure_policy: FetchFailurePolicy::default(),
        }
    }

    pub fn with_options(mut self, options: LocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_failure_policy(mut self, policy: FetchFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Look up the weather at the given coordinates and forward it to the device.
    ///
    /// Coordinates are passed through unchecked; the provider rejects bad ranges.
    pub async fn fetch_weather(&self, latitude: f64, longitude: f64) -> FetchOutcome {
        match self.weather.current_weather(latitude, longitude).await {
            Ok(Some(result)) => {
                tracing::info!(
                    "Weather for {}, {}: {}°C in {}",
                    latitude,
                    longitude,
                    result.temperature,
                    result.city
                );
                self.deliver(&OutboundMessage::Weather(result.clone()));
                FetchOutcome::Sent(result)
            }
            Ok(None) => {
                tracing::warn!("No weather match for {}, {}", latitude, longitude);
                self.fetch_failed();
                FetchOutcome::NoResult
            }
            Err(e) => {
                tracing::warn!("Weather fetch for {}, {} failed: {}", latitude, longitude, e);
                self.fetch_failed();
                FetchOutcome::Failed
            }
        }
    }

    pub async fn location_success(&self, position: Position) -> FetchOutcome {
        self.fetch_weather(position.latitude, position.longitude).await
    }

    /// Tell the device no position is available. The error itself is not forwarded.
    pub fn location_error(&self, error: &LocationError) -> FetchOutcome {
        tracing::warn!("Location unavailable: {}", error);
        self.deliver(&OutboundMessage::LocationUnavailable);
        FetchOutcome::LocationUnavailable
    }

    async fn handle_position(&self, update: Result<Position, LocationError>) -> FetchOutcome {
        match update {
            Ok(position) => {
                tracing::debug!("Got location: {}, {}", position.latitude, position.longitude);
                self.location_success(position).await
            }
            Err(e) => self.location_error(&e),
        }
    }

    /// One-shot cycle: request a position, then fetch and send.
    pub async fn request_once(&self) -> FetchOutcome {
        let update = self.location.current_position(self.options).await;
        self.handle_position(update).await
    }

    /// Start the continuous watch. Every update runs its own cycle.
    ///
    /// Stopping the returned task ends the watch, then waits for the cycles
    /// it already started.
    pub fn start_watch(&self) -> BridgeTask {
        let mut watch = self.location.watch_position(self.options);
        let bridge = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut cycles = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    update = watch.next() => match update {
                        Some(update) => {
                            let cycle = bridge.clone();
                            cycles.spawn(async move {
                                cycle.handle_position(update).await;
                            });
                        }
                        None => break,
                    },
                    _ = &mut stop_rx => break,
                    Some(done) = cycles.join_next(), if !cycles.is_empty() => {
                        log_cycle_result(done);
                    }
                }
            }

            // No more updates; let in-flight cycles deliver.
            drop(watch);
            tracing::debug!("Position watch ended, draining {} cycle(s)", cycles.len());
            while let Some(done) = cycles.join_next().await {
                log_cycle_result(done);
            }
        });

        BridgeTask {
            stop: Some(stop_tx),
            task,
        }
    }

    /// React to a device event without waiting for the resulting cycle(s).
    pub fn handle_event(&self, event: DeviceEvent) -> BridgeTask {
        match event {
            DeviceEvent::Ready => {
                tracing::info!("Device ready, watching position");
                self.start_watch()
            }
            DeviceEvent::AppMessage(message) => {
                tracing::debug!(
                    "Inbound device message ({} keys, fetch request: {})",
                    message.len(),
                    message.is_fetch_request()
                );
                let bridge = self.clone();
                BridgeTask {
                    stop: None,
                    task: tokio::spawn(async move {
                        bridge.request_once().await;
                    }),
                }
            }
        }
    }

    /// Drive the bridge from a stream of device events until the stream closes.
    ///
    /// A repeated `Ready` stops the running watch and starts a new one. On
    /// close every watch is stopped, and nothing returns until all cycles
    /// started so far have delivered.
    pub async fn run(self, mut events: mpsc::Receiver<DeviceEvent>) {
        let mut watch: Option<BridgeTask> = None;
        let mut pending: Vec<BridgeTask> = Vec::new();

        while let Some(event) = events.recv().await {
            match event {
                DeviceEvent::Ready => {
                    if let Some(mut previous) = watch.replace(self.handle_event(DeviceEvent::Ready))
                    {
                        tracing::debug!("Replacing running position watch");
                        previous.request_stop();
                        pending.push(previous);
                    }
                }
                event @ DeviceEvent::AppMessage(_) => {
                    pending.retain(|task| !task.is_finished());
                    pending.push(self.handle_event(event));
                }
            }
        }

        tracing::info!("Device event stream closed, shutting down");
        if let Some(watch) = watch {
            watch.finish().await;
        }
        for task in pending {
            task.finish().await;
        }
    }

    fn deliver(&self, message: &OutboundMessage) {
        if let Err(e) = self.sender.send(message.to_app_message()) {
            tracing::warn!("Failed to send message to device: {}", e);
        }
    }

    fn fetch_failed(&self) {
        if self.failure_policy == FetchFailurePolicy::Fallback {
            self.deliver(&OutboundMessage::WeatherUnavailable);
        }
    }
}
