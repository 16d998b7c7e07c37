use super::actions::{MinIsrRfConflictResolutionAction, TopicConfigUpdateAction};
use super::conflicts::MinIsrRfDetector;
use super::model::TopicConfigDelta;
use super::{TOPIC_ASSIGNMENTS, TOPIC_INFO};
use crate::automation::{Operator, OperatorOutcome};
use crate::cluster::Cluster;
use crate::conflict::{Conflict, ConflictDetectors};
use crate::error::OrionResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_SENSOR_LAG: Duration = Duration::from_secs(90);

/// Reconciles managed topic configuration against observed topics
///
/// One topic is updated per pass. The scheduler re-runs an operator right
/// after a pass that dispatched, so a backlog drains without waiting a full
/// interval per topic.
#[derive(Debug, Clone)]
pub struct TopicConfigOperator {
    detectors: ConflictDetectors,
    max_sensor_lag: Duration,
}

impl TopicConfigOperator {
    pub const NAME: &'static str = "topic_config";

    pub fn new(detectors: ConflictDetectors) -> Self {
        Self {
            detectors,
            max_sensor_lag: DEFAULT_MAX_SENSOR_LAG,
        }
    }

    pub fn with_max_sensor_lag(mut self, max_sensor_lag: Duration) -> Self {
        self.max_sensor_lag = max_sensor_lag;
        self
    }
}

#[async_trait]
impl Operator for TopicConfigOperator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn operate(&self, cluster: &Arc<Cluster>) -> OrionResult<OperatorOutcome> {
        let store = cluster.attributes();
        let missing = store.missing(&[TOPIC_INFO.name(), TOPIC_ASSIGNMENTS.name()]);
        if !missing.is_empty() {
            return Ok(OperatorOutcome::MissingAttributes(
                missing.into_iter().map(String::from).collect(),
            ));
        }

        let (Some(topics), Some(assignments)) = (TOPIC_INFO.get_observed(store), TOPIC_ASSIGNMENTS.get(store))
        else {
            return Ok(OperatorOutcome::Idle);
        };

        let lag = topics.age();
        if lag > self.max_sensor_lag {
            warn!(
                cluster_id = %cluster.id(),
                lag_ms = lag.as_millis() as u64,
                "Topic observations are stale, skipping reconciliation"
            );
            return Ok(OperatorOutcome::Idle);
        }

        let mut outcomes = Vec::new();
        for assignment in &assignments {
            let Some(actual) = topics.value.get(&assignment.topic_name) else {
                debug!(topic = %assignment.topic_name, "Managed topic does not exist yet");
                continue;
            };

            let delta = TopicConfigDelta::between(actual, &assignment.config);
            if delta.is_empty() {
                continue;
            }

            let action = TopicConfigUpdateAction::builder(&assignment.topic_name, &delta)
                .owner(cluster.automation_owner())
                .build();
            let outcome = cluster
                .engine()
                .dispatch_guarded(cluster, action, &self.detectors, &assignment.topic_name)
                .await?;
            let dispatched = outcome.is_dispatched();
            outcomes.push(outcome);
            if dispatched {
                break;
            }
        }

        if outcomes.is_empty() {
            Ok(OperatorOutcome::Idle)
        } else {
            Ok(OperatorOutcome::Decided(outcomes))
        }
    }
}

/// Finds topics whose replication factor is below `min.insync.replicas`
/// and dispatches a resolution for the first one.
#[derive(Debug, Default, Clone)]
pub struct ConfigConflictOperator {
    detector: MinIsrRfDetector,
}

impl ConfigConflictOperator {
    pub const NAME: &'static str = "config_conflict";

    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Operator for ConfigConflictOperator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn operate(&self, cluster: &Arc<Cluster>) -> OrionResult<OperatorOutcome> {
        let store = cluster.attributes();
        // Managed status is read from topic_assignments.
        let missing = store.missing(&[TOPIC_INFO.name(), TOPIC_ASSIGNMENTS.name()]);
        if !missing.is_empty() {
            return Ok(OperatorOutcome::MissingAttributes(
                missing.into_iter().map(String::from).collect(),
            ));
        }
        let Some(topics) = TOPIC_INFO.get(store) else {
            return Ok(OperatorOutcome::Idle);
        };

        let mut outcomes = Vec::new();
        for topic in topics.keys() {
            let Some(conflict) = self.detector.conflict_for(cluster, topic) else {
                continue;
            };
            if !conflict.detect_conflict() {
                continue;
            }

            warn!(
                cluster_id = %cluster.id(),
                topic = %topic,
                replication_factor = conflict.curr_rf,
                min_insync_replicas = conflict.curr_min_isr,
                "⚠️ Replication factor below min.insync.replicas"
            );
            let action = MinIsrRfConflictResolutionAction::builder(&conflict)
                .owner(cluster.automation_owner())
                .build();
            let outcome = cluster.engine().dispatch(cluster, action).await?;
            let dispatched = outcome.is_dispatched();
            outcomes.push(outcome);
            if dispatched {
                break;
            }
        }

        if outcomes.is_empty() {
            Ok(OperatorOutcome::Idle)
        } else {
            Ok(OperatorOutcome::Decided(outcomes))
        }
    }
}
