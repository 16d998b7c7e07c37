use crate::constants::kafka::MIN_INSYNC_REPLICAS;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition: i32,
    pub leader: Option<i32>,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

impl PartitionInfo {
    pub fn is_under_replicated(&self) -> bool {
        self.isr.len() < self.replicas.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: Vec<PartitionInfo>,
    /// Effective configuration, defaults included
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    /// Keys set explicitly on the topic
    #[serde(default)]
    pub override_configs: BTreeSet<String>,
}

impl TopicDescription {
    /// Replica count of the first partition, 0 for a topic without partitions
    pub fn sampled_replication_factor(&self) -> i32 {
        self.partitions
            .first()
            .map_or(0, |partition| partition.replicas.len() as i32)
    }

    pub fn min_insync_replicas(&self) -> Option<i32> {
        self.configs
            .get(MIN_INSYNC_REPLICAS)
            .and_then(|value| value.parse().ok())
    }

    pub fn under_replicated_partitions(&self) -> usize {
        self.partitions
            .iter()
            .filter(|partition| partition.is_under_replicated())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub id: i32,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub rack: Option<String>,
}

/// Managed configuration for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub topic_name: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Difference between a topic's current overrides and its managed config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicConfigDelta {
    pub set: BTreeMap<String, String>,
    /// Overrides to drop back to the broker default
    pub reset: BTreeSet<String>,
}

impl TopicConfigDelta {
    pub fn between(actual: &TopicDescription, ideal: &BTreeMap<String, String>) -> Self {
        let set = ideal
            .iter()
            .filter(|(key, value)| {
                !actual.override_configs.contains(*key) || actual.configs.get(*key) != Some(*value)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let reset = actual
            .override_configs
            .iter()
            .filter(|key| !ideal.contains_key(*key))
            .cloned()
            .collect();
        Self { set, reset }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.reset.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionReassignment {
    pub topic: String,
    pub partition: i32,
    pub replicas: Vec<i32>,
}

/// Target replica lists, in the controller's reassignment document format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignmentPlan {
    pub partitions: Vec<PartitionReassignment>,
}

impl ReassignmentPlan {
    /// From topic -> partition -> replicas
    pub fn from_assignments(assignments: &BTreeMap<String, BTreeMap<i32, Vec<i32>>>) -> Self {
        let partitions = assignments
            .iter()
            .flat_map(|(topic, partitions)| {
                partitions.iter().map(move |(partition, replicas)| PartitionReassignment {
                    topic: topic.clone(),
                    partition: *partition,
                    replicas: replicas.clone(),
                })
            })
            .collect();
        Self { partitions }
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn topics(&self) -> BTreeSet<&str> {
        self.partitions.iter().map(|p| p.topic.as_str()).collect()
    }
}
