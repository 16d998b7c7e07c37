//! # Kafka
//!
//! Kafka-category policies built on the generic control loop. The plugin
//! exposes an admin capability and broker discovery; sensors publish topic
//! state into the cluster's attribute store; operators reconcile managed topic
//! configuration and resolve replication conflicts through actions.
//!
//! Attributes published here:
//!
//! | key | type | sensor |
//! |-----|------|--------|
//! | `topic_info` | topic name -> [`TopicDescription`] | [`KafkaTopicSensor`] |
//! | `topic_assignments` | `Vec<`[`TopicAssignment`]`>` | [`TopicAssignmentSensor`] |
//! | `default_replication_factor` | `i32` | [`TopicAssignmentSensor`] |

pub mod actions;
pub mod admin;
pub mod conflicts;
pub mod model;
pub mod operators;
pub mod plugin;
pub mod sensors;

pub use actions::{
    CreateTopicAction, MinIsrRfConflictResolutionAction, ReassignmentAction, TopicConfigUpdateAction,
};
pub use admin::{AdminError, InMemoryKafkaAdmin, KafkaAdmin};
pub use conflicts::MinIsrRfDetector;
pub use model::{
    BrokerInfo, NewTopic, PartitionInfo, PartitionReassignment, ReassignmentPlan, TopicAssignment,
    TopicConfigDelta, TopicDescription,
};
pub use operators::{ConfigConflictOperator, TopicConfigOperator};
pub use plugin::{KafkaClusterPlugin, KafkaSettings};
pub use sensors::{KafkaTopicSensor, TopicAssignmentSensor};

use crate::attributes::AttributeKey;
use crate::cluster::Cluster;
use crate::error::ActionError;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TOPIC_INFO: AttributeKey<BTreeMap<String, TopicDescription>> = AttributeKey::new("topic_info");

pub const TOPIC_ASSIGNMENTS: AttributeKey<Vec<TopicAssignment>> = AttributeKey::new("topic_assignments");

pub const DEFAULT_REPLICATION_FACTOR: AttributeKey<i32> = AttributeKey::new("default_replication_factor");

/// The cluster's admin capability, or an action error naming the gap
pub(crate) fn admin_for(cluster: &Cluster) -> Result<Arc<dyn KafkaAdmin>, ActionError> {
    cluster
        .plugin()
        .kafka_admin()
        .ok_or_else(|| ActionError::missing_capability("kafka_admin", cluster.id()))
}
