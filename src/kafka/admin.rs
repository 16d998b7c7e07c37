//! Kafka admin capability.
//!
//! [`KafkaAdmin`] is the seam to a real admin client. [`InMemoryKafkaAdmin`]
//! keeps topics and brokers in memory and mirrors a pending reassignment as
//! the controller's coordination path, so the reassignment flow can run end
//! to end without a broker.

use super::model::{BrokerInfo, NewTopic, PartitionInfo, ReassignmentPlan, TopicDescription};
use crate::constants::kafka::REASSIGN_PARTITIONS_PATH;
use crate::coordination::InMemoryCoordinationStore;
use crate::error::{ActionError, ObservationError};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;

pub const KAFKA_ADMIN_SERVICE: &str = "kafka_admin";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Admin client unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Admin request timed out: {operation}")]
    Timeout { operation: String },

    #[error("Unknown topic: {topic}")]
    UnknownTopic { topic: String },

    #[error("Topic already exists: {topic}")]
    TopicExists { topic: String },

    #[error("Request rejected: {reason}")]
    Rejected { reason: String },
}

impl AdminError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    pub fn into_observation(self, sensor: &str) -> ObservationError {
        ObservationError::rpc(sensor, KAFKA_ADMIN_SERVICE, self.to_string())
    }
}

impl From<AdminError> for ActionError {
    fn from(err: AdminError) -> Self {
        if err.is_transient() {
            ActionError::transient(KAFKA_ADMIN_SERVICE, err.to_string())
        } else {
            ActionError::external(KAFKA_ADMIN_SERVICE, err.to_string())
        }
    }
}

#[async_trait]
pub trait KafkaAdmin: Send + Sync {
    async fn describe_topics(&self) -> Result<BTreeMap<String, TopicDescription>, AdminError>;

    async fn describe_brokers(&self) -> Result<Vec<BrokerInfo>, AdminError>;

    /// Incremental update: `set` entries become overrides, `reset` keys revert to defaults
    async fn alter_topic_config(
        &self,
        topic: &str,
        set: &BTreeMap<String, String>,
        reset: &BTreeSet<String>,
    ) -> Result<(), AdminError>;

    async fn create_topic(&self, topic: &NewTopic) -> Result<(), AdminError>;

    async fn submit_reassignment(&self, plan: &ReassignmentPlan) -> Result<(), AdminError>;
}

#[derive(Debug, Default)]
pub struct InMemoryKafkaAdmin {
    topics: DashMap<String, TopicDescription>,
    brokers: RwLock<Vec<BrokerInfo>>,
    broker_defaults: BTreeMap<String, String>,
    coordination: Option<Arc<InMemoryCoordinationStore>>,
    injected_failures: Mutex<VecDeque<AdminError>>,
    reassignments: Mutex<Vec<ReassignmentPlan>>,
}

impl InMemoryKafkaAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker_defaults(mut self, defaults: BTreeMap<String, String>) -> Self {
        self.broker_defaults = defaults;
        self
    }

    /// Create the controller's reassignment path on submit
    pub fn with_coordination(mut self, store: Arc<InMemoryCoordinationStore>) -> Self {
        self.coordination = Some(store);
        self
    }

    pub fn add_broker(&self, broker: BrokerInfo) {
        let mut brokers = self.brokers.write();
        brokers.retain(|existing| existing.id != broker.id);
        brokers.push(broker);
    }

    pub fn remove_broker(&self, id: i32) {
        self.brokers.write().retain(|broker| broker.id != id);
    }

    pub fn put_topic(&self, topic: TopicDescription) {
        self.topics.insert(topic.name.clone(), topic);
    }

    pub fn topic(&self, name: &str) -> Option<TopicDescription> {
        self.topics.get(name).map(|entry| entry.value().clone())
    }

    /// The next call (of any kind) fails with `error`
    pub fn fail_next(&self, error: AdminError) {
        self.injected_failures.lock().push_back(error);
    }

    pub fn reassignments(&self) -> Vec<ReassignmentPlan> {
        self.reassignments.lock().clone()
    }

    fn injected_failure(&self) -> Result<(), AdminError> {
        match self.injected_failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KafkaAdmin for InMemoryKafkaAdmin {
    async fn describe_topics(&self) -> Result<BTreeMap<String, TopicDescription>, AdminError> {
        self.injected_failure()?;
        Ok(self
            .topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn describe_brokers(&self) -> Result<Vec<BrokerInfo>, AdminError> {
        self.injected_failure()?;
        Ok(self.brokers.read().clone())
    }

    async fn alter_topic_config(
        &self,
        topic: &str,
        set: &BTreeMap<String, String>,
        reset: &BTreeSet<String>,
    ) -> Result<(), AdminError> {
        self.injected_failure()?;
        let mut description = self.topics.get_mut(topic).ok_or_else(|| AdminError::UnknownTopic {
            topic: topic.to_string(),
        })?;

        for key in reset {
            description.override_configs.remove(key);
            match self.broker_defaults.get(key) {
                Some(default) => description.configs.insert(key.clone(), default.clone()),
                None => description.configs.remove(key),
            };
        }
        for (key, value) in set {
            description.override_configs.insert(key.clone());
            description.configs.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn create_topic(&self, topic: &NewTopic) -> Result<(), AdminError> {
        self.injected_failure()?;
        if self.topics.contains_key(&topic.name) {
            return Err(AdminError::TopicExists {
                topic: topic.name.clone(),
            });
        }
        if topic.partitions < 1 || topic.replication_factor < 1 {
            return Err(AdminError::Rejected {
                reason: format!(
                    "invalid layout {} partitions x {} replicas",
                    topic.partitions, topic.replication_factor
                ),
            });
        }

        let brokers: Vec<i32> = self.brokers.read().iter().map(|broker| broker.id).collect();
        let replication_factor = topic.replication_factor as usize;
        if brokers.len() < replication_factor {
            return Err(AdminError::Rejected {
                reason: format!(
                    "replication factor {replication_factor} exceeds {} available brokers",
                    brokers.len()
                ),
            });
        }

        let partitions = (0..topic.partitions)
            .map(|partition| {
                let replicas: Vec<i32> = (0..replication_factor)
                    .map(|offset| brokers[(partition as usize + offset) % brokers.len()])
                    .collect();
                PartitionInfo {
                    partition,
                    leader: replicas.first().copied(),
                    isr: replicas.clone(),
                    replicas,
                }
            })
            .collect();

        let mut configs = self.broker_defaults.clone();
        configs.extend(topic.configs.clone());
        self.put_topic(TopicDescription {
            name: topic.name.clone(),
            partitions,
            configs,
            override_configs: topic.configs.keys().cloned().collect(),
        });
        Ok(())
    }

    async fn submit_reassignment(&self, plan: &ReassignmentPlan) -> Result<(), AdminError> {
        self.injected_failure()?;
        for topic in plan.topics() {
            if !self.topics.contains_key(topic) {
                return Err(AdminError::UnknownTopic {
                    topic: topic.to_string(),
                });
            }
        }

        if let Some(store) = &self.coordination {
            let document = serde_json::to_vec(plan).map_err(|e| AdminError::Rejected {
                reason: e.to_string(),
            })?;
            if !store.create(REASSIGN_PARTITIONS_PATH, document) {
                return Err(AdminError::Rejected {
                    reason: "a reassignment is already in progress".to_string(),
                });
            }
        }

        for assignment in &plan.partitions {
            if let Some(mut description) = self.topics.get_mut(&assignment.topic) {
                if let Some(partition) = description
                    .partitions
                    .iter_mut()
                    .find(|p| p.partition == assignment.partition)
                {
                    partition.replicas = assignment.replicas.clone();
                }
            }
        }
        self.reassignments.lock().push(plan.clone());
        Ok(())
    }
}
