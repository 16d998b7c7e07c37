use super::RunRecord;
use crate::action::DispatchOutcome;
use crate::cluster::Cluster;
use crate::error::OrionResult;
use crate::logging::{log_error, log_operator_operation};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// What one operator pass decided
#[derive(Debug, Clone)]
pub enum OperatorOutcome {
    /// Nothing warranted an action
    Idle,
    /// Required attributes were absent; the pass was skipped
    MissingAttributes(Vec<String>),
    /// Dispatch was attempted for each proposed action
    Decided(Vec<DispatchOutcome>),
}

impl OperatorOutcome {
    pub fn dispatched(&self) -> usize {
        match self {
            Self::Decided(outcomes) => outcomes.iter().filter(|o| o.is_dispatched()).count(),
            _ => 0,
        }
    }

    pub fn outcomes(&self) -> &[DispatchOutcome] {
        match self {
            Self::Decided(outcomes) => outcomes,
            _ => &[],
        }
    }
}

/// Periodic decision-maker
///
/// Operators read the attribute stores, tolerate stale or missing data, and
/// dispatch through the cluster's engine, which applies the dispatch guards.
#[async_trait]
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;

    /// Overrides the configured operator interval
    fn interval(&self) -> Option<Duration> {
        None
    }

    async fn operate(&self, cluster: &Arc<Cluster>) -> OrionResult<OperatorOutcome>;
}

/// How a scheduled operator pass ended
#[derive(Debug, Clone)]
pub enum OperatorRun {
    Skipped { reason: String },
    Completed(OperatorOutcome),
    Failed { error: String },
}

impl OperatorRun {
    pub fn dispatched(&self) -> usize {
        match self {
            Self::Completed(outcome) => outcome.dispatched(),
            _ => 0,
        }
    }
}

pub struct OperatorContainer {
    operator: Arc<dyn Operator>,
    interval: Duration,
    timeout: Duration,
    record: RwLock<RunRecord>,
}

impl OperatorContainer {
    pub fn new(operator: Arc<dyn Operator>, default_interval: Duration, timeout: Duration) -> Self {
        let interval = operator.interval().unwrap_or(default_interval);
        Self {
            operator,
            interval,
            timeout,
            record: RwLock::new(RunRecord::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.operator.name()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn record(&self) -> RunRecord {
        self.record.read().clone()
    }

    /// One pass; never propagates a failure to the scheduler
    pub async fn run(&self, cluster: &Arc<Cluster>) -> OperatorRun {
        if cluster.is_in_maintenance() {
            log_operator_operation(self.name(), cluster.id(), "skipped", 0, Some("cluster in maintenance"));
            return OperatorRun::Skipped {
                reason: "cluster in maintenance".to_string(),
            };
        }

        let pass = AssertUnwindSafe(self.operator.operate(cluster)).catch_unwind();
        let result = match tokio::time::timeout(self.timeout, pass).await {
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(_)) => Err("operator panicked".to_string()),
            Err(_) => Err(format!("timed out after {}ms", self.timeout.as_millis())),
        };

        match result {
            Ok(outcome) => {
                self.record.write().succeeded();
                let (status, details) = match &outcome {
                    OperatorOutcome::Idle => ("idle", None),
                    OperatorOutcome::MissingAttributes(keys) => {
                        ("missing_attributes", Some(keys.join(",")))
                    }
                    OperatorOutcome::Decided(outcomes) => (
                        "decided",
                        Some(
                            outcomes
                                .iter()
                                .map(DispatchOutcome::label)
                                .collect::<Vec<_>>()
                                .join(","),
                        ),
                    ),
                };
                log_operator_operation(
                    self.name(),
                    cluster.id(),
                    status,
                    outcome.dispatched(),
                    details.as_deref(),
                );
                OperatorRun::Completed(outcome)
            }
            Err(error) => {
                self.record.write().failed(error.clone());
                log_operator_operation(self.name(), cluster.id(), "failed", 0, Some(&error));
                log_error("operator", self.name(), &error, Some(cluster.id()));
                OperatorRun::Failed { error }
            }
        }
    }
}

impl std::fmt::Debug for OperatorContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorContainer")
            .field("operator", &self.name())
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}
