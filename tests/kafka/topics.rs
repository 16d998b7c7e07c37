use super::{topic, KafkaHarness, CLUSTER_ID};
use orion_automation::action::ActionState;
use orion_automation::alert::AlertLevel;
use orion_automation::attributes::Attribute;
use orion_automation::automation::discovery::NODE_COUNT_ATTRIBUTE;
use orion_automation::automation::{NodeDiscoverySensor, Operator, OperatorOutcome, OperatorRun};
use orion_automation::conflict::ConflictDetectors;
use orion_automation::error::ObservationError;
use orion_automation::kafka::{
    AdminError, CreateTopicAction, NewTopic, TopicConfigOperator, TopicConfigUpdateAction, TOPIC_INFO,
};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

fn events_assignment() -> serde_json::Value {
    json!([{ "topic_name": "events", "config": { "retention.ms": "604800000" } }])
}

#[tokio::test]
async fn test_operator_reconciles_managed_topic_config() {
    let kafka = KafkaHarness::new(events_assignment()).await;
    kafka.admin.put_topic(topic(
        "events",
        6,
        3,
        &[("retention.ms", "86400000"), ("cleanup.policy", "compact")],
    ));
    kafka.observe().await;

    let run = kafka.run_operator(TopicConfigOperator::NAME).await;
    let OperatorRun::Completed(OperatorOutcome::Decided(outcomes)) = run else {
        panic!("expected a decision, got {run:?}");
    };
    assert_eq!(outcomes.len(), 1);
    let action = outcomes[0].action().unwrap();
    assert_eq!(action.name(), TopicConfigUpdateAction::NAME);
    assert_eq!(action.owner(), Some("orion"));
    assert_eq!(action.wait_for_completion().await, ActionState::Succeeded);

    let events = kafka.admin.topic("events").unwrap();
    assert_eq!(events.configs["retention.ms"], "604800000");
    // Unmanaged overrides revert to the broker default.
    assert_eq!(events.configs["cleanup.policy"], "delete");
    assert_eq!(events.override_configs, BTreeSet::from(["retention.ms".to_string()]));

    // The post-run refresh already reflects the change, so the next pass is idle.
    let observed = TOPIC_INFO.get(kafka.harness.cluster.attributes()).unwrap();
    assert_eq!(observed["events"].configs["retention.ms"], "604800000");
    assert!(matches!(
        kafka.run_operator(TopicConfigOperator::NAME).await,
        OperatorRun::Completed(OperatorOutcome::Idle)
    ));
}

#[tokio::test]
async fn test_operator_waits_for_required_attributes() {
    let kafka = KafkaHarness::new(events_assignment()).await;

    let run = kafka.run_operator(TopicConfigOperator::NAME).await;

    let OperatorRun::Completed(OperatorOutcome::MissingAttributes(missing)) = run else {
        panic!("expected missing attributes, got {run:?}");
    };
    assert_eq!(missing, vec!["topic_info".to_string(), "topic_assignments".to_string()]);
}

#[tokio::test]
async fn test_unobserved_managed_topic_is_skipped() {
    let kafka = KafkaHarness::new(events_assignment()).await;
    kafka.observe().await;

    let run = kafka.run_operator(TopicConfigOperator::NAME).await;

    assert!(matches!(run, OperatorRun::Completed(OperatorOutcome::Idle)));
    assert_eq!(kafka.harness.cluster.engine().tracked_count(), 0);
}

#[tokio::test]
async fn test_stale_topic_observations_are_not_acted_on() {
    let kafka = KafkaHarness::new(events_assignment()).await;
    kafka.admin.put_topic(topic("events", 3, 3, &[("retention.ms", "1")]));
    kafka.observe().await;

    let store = kafka.harness.cluster.attributes();
    let mut observed: Attribute = store.get(TOPIC_INFO.name()).unwrap();
    observed.updated_at_ms -= 120_000;
    store.insert(observed);

    let operator = TopicConfigOperator::new(ConflictDetectors::none()).with_max_sensor_lag(Duration::from_secs(90));
    let outcome = operator.operate(&kafka.harness.cluster).await.unwrap();

    assert!(matches!(outcome, OperatorOutcome::Idle));
    assert_eq!(kafka.harness.cluster.engine().tracked_count(), 0);
}

#[tokio::test]
async fn test_failed_topic_sensor_keeps_last_observation() {
    let kafka = KafkaHarness::new(events_assignment()).await;
    kafka.admin.put_topic(topic("events", 3, 3, &[]));
    kafka.observe().await;
    let before = kafka.harness.cluster.attributes().get(TOPIC_INFO.name()).unwrap();

    kafka.admin.fail_next(AdminError::Unavailable {
        reason: "controller moved".to_string(),
    });
    let sensor = kafka.harness.cluster.sensor("kafka_topic").unwrap();
    let err = sensor.run(&kafka.harness.cluster).await.unwrap_err();

    assert!(matches!(err, ObservationError::Rpc { .. }));
    assert_eq!(kafka.harness.cluster.attributes().get(TOPIC_INFO.name()), Some(before));
}

#[tokio::test]
async fn test_create_topic_announces_creation() {
    let kafka = KafkaHarness::new(json!([])).await;
    let spec = NewTopic {
        name: "audit".to_string(),
        partitions: 4,
        replication_factor: 3,
        configs: BTreeMap::from([("retention.ms".to_string(), "3600000".to_string())]),
    };

    let action = kafka.dispatch_and_wait(CreateTopicAction::builder(&spec)).await;

    assert_eq!(action.state(), ActionState::Succeeded);
    let audit = kafka.admin.topic("audit").unwrap();
    assert_eq!(audit.partitions.len(), 4);
    assert_eq!(audit.sampled_replication_factor(), 3);
    assert_eq!(audit.configs["retention.ms"], "3600000");

    let announced = kafka.harness.alerts.alerts_at(AlertLevel::Low);
    assert!(announced.iter().any(|alert| alert.title == "Topic audit created"));
    let observed = TOPIC_INFO.get(kafka.harness.cluster.attributes()).unwrap();
    assert!(observed.contains_key("audit"));
}

#[tokio::test]
async fn test_create_topic_fails_when_announcement_cannot_be_delivered() {
    let kafka = KafkaHarness::new(json!([])).await;
    let spec = NewTopic {
        name: "audit".to_string(),
        partitions: 1,
        replication_factor: 1,
        configs: BTreeMap::new(),
    };
    kafka.harness.alerts.set_failing(true);

    let action = kafka.dispatch_and_wait(CreateTopicAction::builder(&spec)).await;

    assert_eq!(action.state(), ActionState::Failed);
    assert!(action.error().unwrap().contains("notification failed"));
    // The topic itself was created before the announcement failed.
    assert!(kafka.admin.topic("audit").is_some());
}

#[tokio::test]
async fn test_create_topic_rejects_oversized_replication() {
    let kafka = KafkaHarness::new(json!([])).await;
    let spec = NewTopic {
        name: "wide".to_string(),
        partitions: 1,
        replication_factor: 5,
        configs: BTreeMap::new(),
    };

    let action = kafka.dispatch_and_wait(CreateTopicAction::builder(&spec)).await;

    assert_eq!(action.state(), ActionState::Failed);
    assert!(action.error().unwrap().contains("exceeds 3 available brokers"));
    assert!(kafka.admin.topic("wide").is_none());
}

#[tokio::test]
async fn test_brokers_are_discovered_as_nodes() {
    let kafka = KafkaHarness::new(json!([])).await;
    let cluster = &kafka.harness.cluster;

    cluster
        .sensor(NodeDiscoverySensor::NAME)
        .unwrap()
        .run(cluster)
        .await
        .unwrap();

    assert_eq!(cluster.node_count(), 3);
    let broker = cluster.node("2").unwrap();
    assert_eq!(broker.hostname(), "broker-2.kafka.example.com");
    assert_eq!(broker.service_port(), 9092);
    assert_eq!(broker.cluster_id(), CLUSTER_ID);
    assert_eq!(broker.info().rack.as_deref(), Some("use1-az2"));
    assert_eq!(cluster.attributes().value(NODE_COUNT_ATTRIBUTE), Some(json!(3)));

    kafka.admin.remove_broker(3);
    cluster
        .sensor(NodeDiscoverySensor::NAME)
        .unwrap()
        .run(cluster)
        .await
        .unwrap();
    assert!(cluster.node("3").unwrap().is_stale());
}
