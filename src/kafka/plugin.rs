use super::admin::KafkaAdmin;
use super::conflicts::MinIsrRfDetector;
use super::model::TopicAssignment;
use super::operators::{ConfigConflictOperator, TopicConfigOperator};
use super::sensors::{KafkaTopicSensor, TopicAssignmentSensor};
use crate::automation::NodeDiscoverySensor;
use crate::cluster::{Cluster, ClusterPlugin, NodeDiscovery, NodeInfo};
use crate::config::ConfigurationError;
use crate::conflict::ConflictDetectors;
use crate::coordination::CoordinationClient;
use crate::error::ObservationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Plugin settings read from a Kafka cluster's `plugin` config section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct KafkaSettings {
    pub topic_assignments: Vec<TopicAssignment>,
    pub default_replication_factor: i32,
    pub max_sensor_lag_seconds: u64,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            topic_assignments: Vec::new(),
            default_replication_factor: 3,
            max_sensor_lag_seconds: 90,
        }
    }
}

impl KafkaSettings {
    pub fn from_cluster(cluster: &Cluster) -> Result<Self, ConfigurationError> {
        let raw = serde_json::to_value(&cluster.config().plugin)
            .map_err(|e| ConfigurationError::plugin_error(cluster.id(), e))?;
        let settings: Self =
            serde_json::from_value(raw).map_err(|e| ConfigurationError::plugin_error(cluster.id(), e))?;

        if settings.default_replication_factor < 1 {
            return Err(ConfigurationError::plugin_error(
                cluster.id(),
                "default_replication_factor must be at least 1",
            ));
        }
        if settings.max_sensor_lag_seconds == 0 {
            return Err(ConfigurationError::plugin_error(
                cluster.id(),
                "max_sensor_lag_seconds must be greater than 0",
            ));
        }
        if let Some(unnamed) = settings.topic_assignments.iter().find(|a| a.topic_name.trim().is_empty()) {
            return Err(ConfigurationError::plugin_error(
                cluster.id(),
                format!("topic assignment without a topic name: {:?}", unnamed.config),
            ));
        }
        Ok(settings)
    }

    pub fn max_sensor_lag(&self) -> Duration {
        Duration::from_secs(self.max_sensor_lag_seconds)
    }
}

/// Kafka cluster type
///
/// Brokers are discovered through the admin capability. Coordination access
/// is optional and only needed by reassignments.
pub struct KafkaClusterPlugin {
    admin: Arc<dyn KafkaAdmin>,
    coordination: Option<Arc<CoordinationClient>>,
}

impl KafkaClusterPlugin {
    pub const CLUSTER_TYPE: &'static str = "kafka";

    pub fn new(admin: Arc<dyn KafkaAdmin>) -> Self {
        Self {
            admin,
            coordination: None,
        }
    }

    pub fn with_coordination(mut self, coordination: Arc<CoordinationClient>) -> Self {
        self.coordination = Some(coordination);
        self
    }
}

impl ClusterPlugin for KafkaClusterPlugin {
    fn cluster_type(&self) -> &'static str {
        Self::CLUSTER_TYPE
    }

    fn bootstrap(&self, cluster: &Arc<Cluster>) -> Result<(), ConfigurationError> {
        let settings = KafkaSettings::from_cluster(cluster)?;

        cluster.register_sensor(Arc::new(NodeDiscoverySensor));
        cluster.register_sensor(Arc::new(KafkaTopicSensor));
        cluster.register_sensor(Arc::new(TopicAssignmentSensor::new(
            settings.topic_assignments.clone(),
            settings.default_replication_factor,
        )));

        let detectors = ConflictDetectors::none().with(Arc::new(MinIsrRfDetector));
        cluster.register_operator(Arc::new(
            TopicConfigOperator::new(detectors).with_max_sensor_lag(settings.max_sensor_lag()),
        ));
        cluster.register_operator(Arc::new(ConfigConflictOperator::new()));

        info!(
            cluster_id = %cluster.id(),
            managed_topics = settings.topic_assignments.len(),
            default_replication_factor = settings.default_replication_factor,
            coordination = self.coordination.is_some(),
            "🧩 Kafka cluster bootstrapped"
        );
        Ok(())
    }

    fn node_discovery(&self) -> Option<&dyn NodeDiscovery> {
        Some(self)
    }

    fn kafka_admin(&self) -> Option<Arc<dyn KafkaAdmin>> {
        Some(Arc::clone(&self.admin))
    }

    fn coordination(&self) -> Option<Arc<CoordinationClient>> {
        self.coordination.clone()
    }
}

#[async_trait]
impl NodeDiscovery for KafkaClusterPlugin {
    async fn discover(&self, cluster: &Cluster) -> Result<Vec<NodeInfo>, ObservationError> {
        let brokers = self
            .admin
            .describe_brokers()
            .await
            .map_err(|e| e.into_observation(NodeDiscoverySensor::NAME))?;

        Ok(brokers
            .into_iter()
            .map(|broker| {
                let info = NodeInfo::new(broker.id.to_string(), broker.host, broker.port, cluster.id());
                match broker.rack {
                    Some(rack) => info.with_rack(rack),
                    None => info,
                }
            })
            .collect())
    }
}

impl std::fmt::Debug for KafkaClusterPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaClusterPlugin")
            .field("coordination", &self.coordination.is_some())
            .finish()
    }
}
