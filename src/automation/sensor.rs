use super::RunRecord;
use crate::cluster::Cluster;
use crate::error::ObservationError;
use crate::logging::{log_error, log_sensor_operation};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Periodic observer that writes cluster or node state into attribute stores
///
/// `observe` must bound every external call it makes. A failed pass must
/// leave previously published attributes untouched, so sensors publish only
/// after all their calls succeeded.
#[async_trait]
pub trait Sensor: Send + Sync {
    fn name(&self) -> &str;

    /// Overrides the configured sensor interval
    fn interval(&self) -> Option<Duration> {
        None
    }

    async fn observe(&self, cluster: &Cluster) -> Result<(), ObservationError>;
}

/// Schedules one sensor and records how its passes went
pub struct SensorContainer {
    sensor: Arc<dyn Sensor>,
    interval: Duration,
    timeout: Duration,
    record: RwLock<RunRecord>,
    // Scheduled and on-demand passes of the same sensor never overlap.
    pass_lock: tokio::sync::Mutex<()>,
}

impl SensorContainer {
    pub fn new(sensor: Arc<dyn Sensor>, default_interval: Duration, timeout: Duration) -> Self {
        let interval = sensor.interval().unwrap_or(default_interval);
        Self {
            sensor,
            interval,
            timeout,
            record: RwLock::new(RunRecord::default()),
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.sensor.name()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn record(&self) -> RunRecord {
        self.record.read().clone()
    }

    /// One bounded, panic-isolated observation pass
    pub async fn run(&self, cluster: &Cluster) -> Result<(), ObservationError> {
        let _pass = self.pass_lock.lock().await;
        let started = Instant::now();

        let observation = AssertUnwindSafe(self.sensor.observe(cluster)).catch_unwind();
        let result = match tokio::time::timeout(self.timeout, observation).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ObservationError::Panicked {
                sensor: self.name().to_string(),
            }),
            Err(_) => Err(ObservationError::Timeout {
                sensor: self.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => {
                self.record.write().succeeded();
                log_sensor_operation(self.name(), cluster.id(), "succeeded", Some(elapsed_ms), None);
            }
            Err(e) => {
                let message = e.to_string();
                self.record.write().failed(message.clone());
                log_sensor_operation(self.name(), cluster.id(), "failed", Some(elapsed_ms), Some(&message));
                log_error("sensor", self.name(), &message, Some(cluster.id()));
            }
        }
        result
    }
}

impl std::fmt::Debug for SensorContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorContainer")
            .field("sensor", &self.name())
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}
