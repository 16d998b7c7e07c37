mod reassignment;
mod topics;

use crate::common::{fast_actions, Harness, TEST_OWNER};
use orion_automation::action::{Action, ActionBuilder, DispatchOutcome};
use orion_automation::config::ClusterConfig;
use orion_automation::coordination::{CoordinationClient, InMemoryConnector, InMemoryCoordinationStore};
use orion_automation::kafka::{
    BrokerInfo, InMemoryKafkaAdmin, KafkaClusterPlugin, KafkaTopicSensor, PartitionInfo, TopicAssignmentSensor,
    TopicDescription,
};
use orion_automation::retry::RetryPolicy;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

pub const CLUSTER_ID: &str = "kafka-1";

pub struct KafkaHarness {
    pub harness: Harness,
    pub admin: Arc<InMemoryKafkaAdmin>,
    pub store: Arc<InMemoryCoordinationStore>,
}

impl KafkaHarness {
    /// Cluster managing `assignments` (a JSON list of topic assignments)
    pub async fn new(assignments: Value) -> Self {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let connector = InMemoryConnector::new("zk-kafka-1:2181", Arc::clone(&store));
        Self::with_connector(assignments, store, connector).await
    }

    pub async fn with_connector(
        assignments: Value,
        store: Arc<InMemoryCoordinationStore>,
        connector: InMemoryConnector,
    ) -> Self {
        let admin = Arc::new(
            InMemoryKafkaAdmin::new()
                .with_broker_defaults(BTreeMap::from([
                    ("cleanup.policy".to_string(), "delete".to_string()),
                    ("min.insync.replicas".to_string(), "1".to_string()),
                ]))
                .with_coordination(Arc::clone(&store)),
        );
        for id in 1..=3 {
            admin.add_broker(BrokerInfo {
                id,
                host: format!("broker-{id}.kafka.example.com"),
                port: 9092,
                rack: Some(format!("use1-az{id}")),
            });
        }

        let coordination = CoordinationClient::new(
            Arc::new(connector),
            RetryPolicy::new(3, Duration::from_millis(5)),
            Duration::from_millis(10),
        );
        let plugin = KafkaClusterPlugin::new(admin.clone()).with_coordination(Arc::new(coordination));
        let config = ClusterConfig::new(CLUSTER_ID, "Kafka One", KafkaClusterPlugin::CLUSTER_TYPE)
            .with_plugin_setting("topic_assignments", assignments)
            .with_plugin_setting("default_replication_factor", json!(3));
        let harness = Harness::build(config, Arc::new(plugin), fast_actions()).await;

        Self { harness, admin, store }
    }

    /// Run the topic and assignment sensors once
    pub async fn observe(&self) {
        let cluster = &self.harness.cluster;
        for name in [KafkaTopicSensor::NAME, TopicAssignmentSensor::NAME] {
            cluster
                .sensor(name)
                .unwrap_or_else(|| panic!("sensor {name} registered"))
                .run(cluster)
                .await
                .unwrap();
        }
    }

    pub async fn run_operator(&self, name: &str) -> orion_automation::automation::OperatorRun {
        let cluster = &self.harness.cluster;
        let operator = cluster
            .operators()
            .into_iter()
            .find(|operator| operator.name() == name)
            .unwrap_or_else(|| panic!("operator {name} registered"));
        operator.run(cluster).await
    }

    pub async fn dispatch_and_wait(&self, action: ActionBuilder) -> Arc<Action> {
        let cluster = &self.harness.cluster;
        let outcome = cluster
            .engine()
            .dispatch_and_wait(cluster, action.owner(TEST_OWNER).build())
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Dispatched(action) => action,
            other => panic!("expected dispatch, got {other:?}"),
        }
    }
}

/// A topic whose partitions all carry `replication_factor` replicas
pub fn topic(name: &str, partitions: i32, replication_factor: usize, overrides: &[(&str, &str)]) -> TopicDescription {
    let partitions = (0..partitions)
        .map(|partition| {
            let replicas: Vec<i32> = (0..replication_factor)
                .map(|offset| ((partition as usize + offset) % 3) as i32 + 1)
                .collect();
            PartitionInfo {
                partition,
                leader: replicas.first().copied(),
                isr: replicas.clone(),
                replicas,
            }
        })
        .collect();
    let mut configs = BTreeMap::from([
        ("cleanup.policy".to_string(), "delete".to_string()),
        ("min.insync.replicas".to_string(), "1".to_string()),
    ]);
    let mut override_configs = BTreeSet::new();
    for (key, value) in overrides {
        configs.insert((*key).to_string(), (*value).to_string());
        override_configs.insert((*key).to_string());
    }
    TopicDescription {
        name: name.to_string(),
        partitions,
        configs,
        override_configs,
    }
}
