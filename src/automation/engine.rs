//! # Automation Engine
//!
//! Hosts the observe/decide loop for a set of clusters. Every sensor and
//! every operator gets its own task on its own interval, so a slow sensor
//! never delays an unrelated one. Two housekeeping tasks per cluster sweep
//! expired actions and checkpoint observation state.
//!
//! All tasks stop when [`AutomationEngine::shutdown`] flips the shared
//! `watch` channel.

use super::{OperatorContainer, SensorContainer};
use crate::cluster::Cluster;
use crate::config::StateConfig;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

pub struct AutomationEngine {
    clusters: Vec<Arc<Cluster>>,
    cleanup_interval: Duration,
    checkpoint_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationEngine {
    pub fn new(clusters: Vec<Arc<Cluster>>, cleanup_interval: Duration, state: &StateConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            clusters,
            cleanup_interval,
            checkpoint_interval: state.checkpoint_interval(),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn clusters(&self) -> &[Arc<Cluster>] {
        &self.clusters
    }

    pub fn cluster(&self, id: &str) -> Option<&Arc<Cluster>> {
        self.clusters.iter().find(|cluster| cluster.id() == id)
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Spawn every loop; calling it again while running is a no-op
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            debug!("Automation engine already running");
            return;
        }
        self.shutdown_tx.send_replace(false);

        for cluster in &self.clusters {
            let span = cluster.span();
            for sensor in cluster.sensors() {
                let task = sensor_loop(Arc::clone(cluster), sensor, self.shutdown_tx.subscribe());
                tasks.push(tokio::spawn(task.instrument(span.clone())));
            }
            for operator in cluster.operators() {
                let task = operator_loop(Arc::clone(cluster), operator, self.shutdown_tx.subscribe());
                tasks.push(tokio::spawn(task.instrument(span.clone())));
            }
            let cleanup = cleanup_loop(Arc::clone(cluster), self.cleanup_interval, self.shutdown_tx.subscribe());
            tasks.push(tokio::spawn(cleanup.instrument(span.clone())));

            if cluster.has_state_sink() {
                let checkpoint = checkpoint_loop(
                    Arc::clone(cluster),
                    self.checkpoint_interval,
                    self.shutdown_tx.subscribe(),
                );
                tasks.push(tokio::spawn(checkpoint.instrument(span)));
            }
        }

        info!(
            clusters = self.clusters.len(),
            tasks = tasks.len(),
            "🚀 Automation engine started"
        );
    }

    /// Stop every loop and wait for them to exit
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Automation task ended abnormally");
            }
        }
        info!(tasks = count, "🛑 Automation engine stopped");
    }
}

impl std::fmt::Debug for AutomationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationEngine")
            .field("clusters", &self.clusters.len())
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}

/// Sleep for `wait`, returning false if shutdown was signalled first
async fn pause(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

async fn sensor_loop(cluster: Arc<Cluster>, sensor: Arc<SensorContainer>, mut shutdown: watch::Receiver<bool>) {
    debug!(sensor = %sensor.name(), interval_ms = sensor.interval().as_millis() as u64, "Sensor loop started");
    loop {
        // Failures are recorded and logged by the container.
        let _ = sensor.run(&cluster).await;
        if !pause(sensor.interval(), &mut shutdown).await {
            break;
        }
    }
    debug!(sensor = %sensor.name(), "Sensor loop ended");
}

async fn operator_loop(
    cluster: Arc<Cluster>,
    operator: Arc<OperatorContainer>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(operator = %operator.name(), interval_ms = operator.interval().as_millis() as u64, "Operator loop started");
    loop {
        let run = operator.run(&cluster).await;
        // A pass that dispatched is followed by another one right away.
        let wait = if run.dispatched() > 0 {
            Duration::ZERO
        } else {
            operator.interval()
        };
        if !pause(wait, &mut shutdown).await {
            break;
        }
    }
    debug!(operator = %operator.name(), "Operator loop ended");
}

async fn cleanup_loop(cluster: Arc<Cluster>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    while pause(interval, &mut shutdown).await {
        let removed = cluster.engine().cleanup_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept expired actions");
        }
    }
}

async fn checkpoint_loop(cluster: Arc<Cluster>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    while pause(interval, &mut shutdown).await {
        if let Err(e) = cluster.checkpoint().await {
            warn!(error = %e, "Checkpoint failed");
        }
    }
    // Final checkpoint so a clean restart sees the latest observations.
    if let Err(e) = cluster.checkpoint().await {
        warn!(error = %e, "Final checkpoint failed");
    }
}
