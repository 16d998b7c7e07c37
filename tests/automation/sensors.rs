use crate::common::{fast_actions, test_cluster_config, Harness, ScriptedDiscovery, TestPlugin};
use async_trait::async_trait;
use orion_automation::automation::discovery::NODE_COUNT_ATTRIBUTE;
use orion_automation::automation::{NodeDiscoverySensor, Sensor};
use orion_automation::cluster::{Cluster, NodeInfo};
use orion_automation::error::ObservationError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn broker(id: &str) -> NodeInfo {
    NodeInfo::new(id, format!("{id}.kafka.example.com"), 9092, "test-1")
}

async fn harness_with_discovery() -> (Harness, Arc<ScriptedDiscovery>) {
    let discovery = Arc::new(ScriptedDiscovery::default());
    let plugin = Arc::new(TestPlugin::with_discovery(Arc::clone(&discovery)));
    let harness = Harness::build(test_cluster_config(), plugin, fast_actions()).await;
    harness.cluster.register_sensor(Arc::new(NodeDiscoverySensor));
    (harness, discovery)
}

struct SleepySensor;

#[async_trait]
impl Sensor for SleepySensor {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn observe(&self, _cluster: &Cluster) -> Result<(), ObservationError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

struct PanickingSensor;

#[async_trait]
impl Sensor for PanickingSensor {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn observe(&self, _cluster: &Cluster) -> Result<(), ObservationError> {
        panic!("sensor blew up");
    }
}

#[tokio::test]
async fn test_node_discovery_tracks_membership() {
    let (harness, discovery) = harness_with_discovery().await;
    let cluster = &harness.cluster;
    let sensor = cluster.sensor(NodeDiscoverySensor::NAME).unwrap();

    discovery.set_nodes(vec![broker("1"), broker("2"), broker("3")]);
    sensor.run(cluster).await.unwrap();
    assert_eq!(cluster.node_count(), 3);
    assert_eq!(cluster.attributes().value(NODE_COUNT_ATTRIBUTE), Some(json!(3)));

    discovery.set_nodes(vec![broker("1"), broker("2")]);
    sensor.run(cluster).await.unwrap();
    // Missing nodes stay tracked but are flagged.
    assert_eq!(cluster.node_count(), 3);
    assert!(cluster.node("3").unwrap().is_stale());
    assert!(!cluster.node("1").unwrap().is_stale());
    assert_eq!(cluster.attributes().value(NODE_COUNT_ATTRIBUTE), Some(json!(2)));

    discovery.set_nodes(vec![broker("1"), broker("2"), broker("3")]);
    sensor.run(cluster).await.unwrap();
    assert!(!cluster.node("3").unwrap().is_stale());
}

#[tokio::test]
async fn test_failed_pass_keeps_previous_attributes() {
    let (harness, discovery) = harness_with_discovery().await;
    let cluster = &harness.cluster;
    let sensor = cluster.sensor(NodeDiscoverySensor::NAME).unwrap();

    discovery.set_nodes(vec![broker("1"), broker("2")]);
    sensor.run(cluster).await.unwrap();
    let published = cluster.attributes().get(NODE_COUNT_ATTRIBUTE).unwrap();

    discovery.set_failing(true);
    let err = sensor.run(cluster).await.unwrap_err();
    assert!(matches!(err, ObservationError::Rpc { .. }));

    assert_eq!(cluster.attributes().get(NODE_COUNT_ATTRIBUTE), Some(published));
    assert_eq!(cluster.node_count(), 2);
    assert!(!cluster.node("2").unwrap().is_stale());

    let record = sensor.record();
    assert!(record.is_failing());
    assert_eq!(record.runs, 2);
    assert_eq!(record.failures, 1);
    assert!(record.last_error.unwrap().contains("inventory unavailable"));
}

#[tokio::test]
async fn test_discovery_without_capability_fails() {
    let harness = Harness::new().await;
    let sensor = harness.cluster.register_sensor(Arc::new(NodeDiscoverySensor));

    let err = sensor.run(&harness.cluster).await.unwrap_err();
    assert!(matches!(err, ObservationError::MissingCapability { ref capability, .. } if capability == "node_discovery"));
}

#[tokio::test]
async fn test_sensor_pass_is_bounded_by_timeout() {
    let harness = Harness::new().await;
    let sensor = harness.cluster.register_sensor(Arc::new(SleepySensor));

    let err = sensor.run(&harness.cluster).await.unwrap_err();
    assert_eq!(
        err,
        ObservationError::Timeout {
            sensor: "sleepy".to_string(),
            timeout_ms: 500,
        }
    );
}

#[tokio::test]
async fn test_panicking_sensor_is_isolated() {
    let harness = Harness::new().await;
    let sensor = harness.cluster.register_sensor(Arc::new(PanickingSensor));

    let err = sensor.run(&harness.cluster).await.unwrap_err();
    assert!(matches!(err, ObservationError::Panicked { .. }));
    assert_eq!(sensor.record().failures, 1);
}
