use super::model::TopicAssignment;
use super::{DEFAULT_REPLICATION_FACTOR, TOPIC_ASSIGNMENTS, TOPIC_INFO};
use crate::automation::Sensor;
use crate::cluster::Cluster;
use crate::error::ObservationError;
use async_trait::async_trait;
use tracing::debug;

/// Publishes every topic's partitions and configuration as `topic_info`
#[derive(Debug, Default)]
pub struct KafkaTopicSensor;

impl KafkaTopicSensor {
    pub const NAME: &'static str = "kafka_topic";
}

#[async_trait]
impl Sensor for KafkaTopicSensor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn observe(&self, cluster: &Cluster) -> Result<(), ObservationError> {
        let admin = cluster
            .plugin()
            .kafka_admin()
            .ok_or_else(|| ObservationError::missing_capability(Self::NAME, "kafka_admin"))?;

        let topics = admin
            .describe_topics()
            .await
            .map_err(|e| e.into_observation(Self::NAME))?;

        let under_replicated: usize = topics.values().map(|t| t.under_replicated_partitions()).sum();
        debug!(
            cluster_id = %cluster.id(),
            topics = topics.len(),
            under_replicated_partitions = under_replicated,
            "Observed topics"
        );

        TOPIC_INFO
            .set(cluster.attributes(), &topics, Self::NAME)
            .map_err(|e| ObservationError::invalid_data(Self::NAME, e.to_string()))
    }
}

/// Publishes the managed topic configuration from plugin settings
#[derive(Debug, Clone)]
pub struct TopicAssignmentSensor {
    assignments: Vec<TopicAssignment>,
    default_replication_factor: i32,
}

impl TopicAssignmentSensor {
    pub const NAME: &'static str = "topic_assignment";

    pub fn new(assignments: Vec<TopicAssignment>, default_replication_factor: i32) -> Self {
        Self {
            assignments,
            default_replication_factor,
        }
    }
}

#[async_trait]
impl Sensor for TopicAssignmentSensor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn observe(&self, cluster: &Cluster) -> Result<(), ObservationError> {
        let store = cluster.attributes();
        TOPIC_ASSIGNMENTS
            .set(store, &self.assignments, Self::NAME)
            .and_then(|_| DEFAULT_REPLICATION_FACTOR.set(store, &self.default_replication_factor, Self::NAME))
            .map_err(|e| ObservationError::invalid_data(Self::NAME, e.to_string()))
    }
}
