//! Position acquisition: one-shot requests and a continuous watch.
//!
//! `Geolocation` plays the part of the host location capability. It applies
//! `LocationOptions` on top of a raw `PositionSource`: a fix younger than
//! `maximum_age` is served from cache, and a read slower than `timeout`
//! fails with `LocationError::Timeout`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::{LocationError, LocationOptions, Position};

/// Raw device position reader, without caching or timeouts.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn acquire(&self) -> Result<Position, LocationError>;
}

/// Location capability consumed by the bridge.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Resolve a single position.
    async fn current_position(&self, options: LocationOptions) -> Result<Position, LocationError>;

    /// Start a continuous watch. Dropping the returned handle stops it.
    fn watch_position(&self, options: LocationOptions) -> PositionWatch;
}

/// Stream of position updates (or errors) from a watch.
#[derive(Debug)]
pub struct PositionWatch {
    updates: mpsc::Receiver<Result<Position, LocationError>>,
    task: Option<JoinHandle<()>>,
}

impl PositionWatch {
    /// Wrap an existing update channel. Used by providers that push updates themselves.
    pub fn from_receiver(updates: mpsc::Receiver<Result<Position, LocationError>>) -> Self {
        Self {
            updates,
            task: None,
        }
    }

    /// Next update, or `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<Result<Position, LocationError>> {
        self.updates.recv().await
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Position taken from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPositionSource {
    coordinates: Option<(f64, f64)>,
}

impl FixedPositionSource {
    pub fn new(coordinates: Option<(f64, f64)>) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn acquire(&self) -> Result<Position, LocationError> {
        match self.coordinates {
            Some((lat, lon)) => Ok(Position::new(lat, lon)),
            None => Err(LocationError::ServiceUnavailable),
        }
    }
}

/// Location capability backed by a `PositionSource`.
pub struct Geolocation<S> {
    inner: Arc<GeolocationInner<S>>,
    watch_interval: Duration,
}

struct GeolocationInner<S> {
    source: S,
    last_fix: Mutex<Option<Position>>,
}

impl<S: PositionSource + 'static> Geolocation<S> {
    pub fn new(source: S, watch_interval: Duration) -> Self {
        Self {
            inner: Arc::new(GeolocationInner {
                source,
                last_fix: Mutex::new(None),
            }),
            watch_interval,
        }
    }
}

impl<S: PositionSource> GeolocationInner<S> {
    async fn resolve(&self, options: LocationOptions) -> Result<Position, LocationError> {
        if let Some(cached) = *self.last_fix.lock() {
            if cached.age() <= options.maximum_age {
                tracing::debug!(age_ms = cached.age().as_millis() as u64, "Using cached fix");
                return Ok(cached);
            }
        }

        let position = tokio::time::timeout(options.timeout, self.source.acquire())
            .await
            .map_err(|_| LocationError::Timeout)??;

        *self.last_fix.lock() = Some(position);
        Ok(position)
    }
}

#[async_trait]
impl<S: PositionSource + 'static> LocationProvider for Geolocation<S> {
    async fn current_position(&self, options: LocationOptions) -> Result<Position, LocationError> {
        self.inner.resolve(options).await
    }

    fn watch_position(&self, options: LocationOptions) -> PositionWatch {
        let (tx, rx) = mpsc::channel(8);
        let inner = Arc::clone(&self.inner);
        let period = self.watch_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let update = inner.resolve(options).await;
                if tx.send(update).await.is_err() {
                    tracing::debug!("Position watch receiver dropped");
                    break;
                }
            }
        });

        PositionWatch {
            updates: rx,
            task: Some(task),
        }
    }
}
