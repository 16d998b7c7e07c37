//! Kafka actions.
//!
//! Each handler comes with a `builder` that fills in the parameters it reads,
//! its identity keys and, where the effect is visible to a sensor, the sensors
//! to re-run once it succeeds.

use super::admin::AdminError;
use super::model::{NewTopic, ReassignmentPlan, TopicConfigDelta};
use super::sensors::KafkaTopicSensor;
use super::admin_for;
use crate::action::{Action, ActionBuilder, ActionContext, ActionHandler, ActionType, ChildPolicy};
use crate::alert::AlertLevel;
use crate::conflict::MinIsrRfConflict;
use crate::constants::kafka::{MIN_INSYNC_REPLICAS, REASSIGN_PARTITIONS_PATH};
use crate::constants::results::POLL_COUNT;
use crate::error::ActionError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const TOPIC_PARAMETER: &str = "topic";

/// Applies an incremental config change to one topic
#[derive(Debug, Default)]
pub struct TopicConfigUpdateAction;

impl TopicConfigUpdateAction {
    pub const NAME: &'static str = "topic_config_update";
    pub const SET_CONFIGS: &'static str = "set_configs";
    pub const RESET_CONFIGS: &'static str = "reset_configs";

    /// At most one config update per topic is in flight
    pub fn builder(topic: &str, delta: &TopicConfigDelta) -> ActionBuilder {
        Action::builder(Self::NAME, ActionType::Cluster, Arc::new(Self))
            .parameter(TOPIC_PARAMETER, topic)
            .parameter(Self::SET_CONFIGS, json!(delta.set))
            .parameter(Self::RESET_CONFIGS, json!(delta.reset))
            .identity_keys([TOPIC_PARAMETER])
            .post_run_sensors([KafkaTopicSensor::NAME])
    }
}

#[async_trait]
impl ActionHandler for TopicConfigUpdateAction {
    fn description(&self) -> &'static str {
        "Update topic configuration overrides"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let topic: String = ctx.parameter(TOPIC_PARAMETER)?;
        let set: BTreeMap<String, String> = ctx.optional_parameter(Self::SET_CONFIGS)?.unwrap_or_default();
        let reset: BTreeSet<String> = ctx.optional_parameter(Self::RESET_CONFIGS)?.unwrap_or_default();

        if set.is_empty() && reset.is_empty() {
            debug!(topic = %topic, "No config change requested");
            return Ok(());
        }

        admin_for(ctx.cluster())?
            .alter_topic_config(&topic, &set, &reset)
            .await?;

        info!(
            cluster_id = %ctx.cluster().id(),
            topic = %topic,
            set = set.len(),
            reset = reset.len(),
            "🛠️ Topic config updated"
        );
        ctx.set_result("updated_keys", &set.keys().chain(reset.iter()).collect::<Vec<_>>())
    }
}

/// Creates a topic and announces it
///
/// The announcement is part of the action: if it cannot be delivered the
/// action fails even though the topic exists.
#[derive(Debug, Default)]
pub struct CreateTopicAction;

impl CreateTopicAction {
    pub const NAME: &'static str = "create_topic";

    pub fn builder(topic: &NewTopic) -> ActionBuilder {
        Action::builder(Self::NAME, ActionType::Cluster, Arc::new(Self))
            .parameter(TOPIC_PARAMETER, topic.name.as_str())
            .parameter("spec", json!(topic))
            .identity_keys([TOPIC_PARAMETER])
            .post_run_sensors([KafkaTopicSensor::NAME])
    }
}

#[async_trait]
impl ActionHandler for CreateTopicAction {
    fn description(&self) -> &'static str {
        "Create a topic"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let topic: NewTopic = ctx.parameter("spec")?;
        match admin_for(ctx.cluster())?.create_topic(&topic).await {
            Ok(()) => Ok(()),
            // An earlier attempt may have created it before failing.
            Err(AdminError::TopicExists { .. }) if ctx.attempt() > 1 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn on_succeeded(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let topic: NewTopic = ctx.parameter("spec")?;
        ctx.notify(
            AlertLevel::Low,
            format!("Topic {} created", topic.name),
            format!(
                "Created topic {} on cluster {} with {} partitions and replication factor {}",
                topic.name,
                ctx.cluster().id(),
                topic.partitions,
                topic.replication_factor
            ),
        )
        .await
    }
}

/// Resolves replication factor below `min.insync.replicas`
///
/// Topics under managed configuration are only alerted on, since the managed
/// value would be reapplied. Everything else gets `min.insync.replicas`
/// lowered to the replication factor through a child config update.
#[derive(Debug, Default)]
pub struct MinIsrRfConflictResolutionAction;

impl MinIsrRfConflictResolutionAction {
    pub const NAME: &'static str = "min_isr_rf_conflict_resolution";
    pub const CONFLICT: &'static str = "conflict";

    pub fn builder(conflict: &MinIsrRfConflict) -> ActionBuilder {
        Action::builder(Self::NAME, ActionType::Cluster, Arc::new(Self))
            .parameter(TOPIC_PARAMETER, conflict.topic_name.as_str())
            .parameter(Self::CONFLICT, json!(conflict))
            .identity_keys([TOPIC_PARAMETER])
    }
}

#[async_trait]
impl ActionHandler for MinIsrRfConflictResolutionAction {
    fn description(&self) -> &'static str {
        "Resolve min.insync.replicas above replication factor"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let conflict: MinIsrRfConflict = ctx.parameter(Self::CONFLICT)?;
        let topic = conflict.topic_name.as_str();
        let cluster_id = ctx.cluster().id().to_string();

        if conflict.curr_rf < 1 {
            // Sampled partition had no replicas; the assignment itself is suspect.
            ctx.raise_alert(
                AlertLevel::Medium,
                "Detected mismatch in replicas size for sampled partitions",
                format!("Topic: {topic}, cluster: {cluster_id}"),
            )
            .await;
            return Ok(());
        }

        if conflict.topic_in_override_conf {
            ctx.raise_alert(
                AlertLevel::High,
                format!("min.insync.replicas conflicts with replication factor for topic {topic} on cluster {cluster_id}"),
                format!(
                    "min.insync.replicas = {} > {} = replication factor for topic {topic} on cluster {cluster_id}",
                    conflict.curr_min_isr, conflict.curr_rf
                ),
            )
            .await;
            return Ok(());
        }

        let delta = TopicConfigDelta {
            set: BTreeMap::from([(MIN_INSYNC_REPLICAS.to_string(), conflict.curr_rf.to_string())]),
            reset: BTreeSet::new(),
        };
        let child = TopicConfigUpdateAction::builder(topic, &delta).build();
        let outcome = ctx.dispatch_child(child, ChildPolicy::FailParent).await;

        ctx.raise_alert(
            AlertLevel::Medium,
            format!("Action dispatched to set minIsr = RF for topic {topic} on cluster {cluster_id}"),
            format!(
                "min.insync.replicas was {}. Setting it to {} to match RF on the topic.",
                conflict.curr_min_isr, conflict.curr_rf
            ),
        )
        .await;

        outcome?;
        ctx.set_result(MIN_INSYNC_REPLICAS, &conflict.curr_rf)
    }
}

/// Moves partition replicas and waits for the controller to finish
///
/// Only one reassignment runs per cluster. With `wait_for_previous` set the
/// action queues behind a running one instead of failing. `max_wait_ms` is a
/// budget shared by the queueing wait and the wait for this reassignment.
#[derive(Debug, Default)]
pub struct ReassignmentAction;

impl ReassignmentAction {
    pub const NAME: &'static str = "reassignment";
    pub const REASSIGNMENT: &'static str = "reassignment";
    pub const WAIT_FOR_PREVIOUS: &'static str = "wait_for_previous";
    pub const MAX_WAIT_MS: &'static str = "max_wait_ms";

    /// `assignments` maps topic -> partition -> target replicas
    pub fn builder(assignments: &BTreeMap<String, BTreeMap<i32, Vec<i32>>>) -> ActionBuilder {
        Action::builder(Self::NAME, ActionType::Cluster, Arc::new(Self))
            .parameter(Self::REASSIGNMENT, json!(assignments))
            .post_run_sensors([KafkaTopicSensor::NAME])
    }
}

#[async_trait]
impl ActionHandler for ReassignmentAction {
    fn description(&self) -> &'static str {
        "Reassign partition replicas"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let assignments: BTreeMap<String, BTreeMap<i32, Vec<i32>>> = ctx.parameter(Self::REASSIGNMENT)?;
        let plan = ReassignmentPlan::from_assignments(&assignments);
        if plan.is_empty() {
            return Err(ActionError::precondition("reassignment has no partitions"));
        }
        let wait_for_previous = ctx.optional_parameter::<bool>(Self::WAIT_FOR_PREVIOUS)?.unwrap_or(false);
        let deadline = ctx
            .optional_parameter::<u64>(Self::MAX_WAIT_MS)?
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let remaining = || deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));

        let cluster = ctx.cluster();
        let coordination = cluster
            .plugin()
            .coordination()
            .ok_or_else(|| ActionError::missing_capability("coordination", cluster.id()))?;
        let admin = admin_for(cluster)?;

        if coordination.exists(REASSIGN_PARTITIONS_PATH).await? {
            if !wait_for_previous {
                return Err(ActionError::precondition("Reassignment already running"));
            }
            info!(cluster_id = %cluster.id(), "⏳ Waiting for previous reassignment");
            coordination
                .wait_for_path_deleted_with(REASSIGN_PARTITIONS_PATH, coordination.poll_interval(), remaining())
                .await?;
        }

        admin.submit_reassignment(&plan).await?;
        info!(
            cluster_id = %cluster.id(),
            partitions = plan.partitions.len(),
            topics = plan.topics().len(),
            "🔀 Reassignment submitted"
        );

        let polls = coordination
            .wait_for_path_deleted_with(REASSIGN_PARTITIONS_PATH, coordination.poll_interval(), remaining())
            .await?;
        ctx.set_result(POLL_COUNT, &polls)
    }
}
