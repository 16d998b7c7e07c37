use super::{topic, KafkaHarness};
use orion_automation::action::ActionState;
use orion_automation::constants::kafka::REASSIGN_PARTITIONS_PATH;
use orion_automation::constants::results::POLL_COUNT;
use orion_automation::coordination::{InMemoryConnector, InMemoryCoordinationStore};
use orion_automation::kafka::ReassignmentAction;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

fn move_partition_zero() -> BTreeMap<String, BTreeMap<i32, Vec<i32>>> {
    BTreeMap::from([("events".to_string(), BTreeMap::from([(0, vec![3, 1])]))])
}

/// Stands in for the Kafka controller: clears the reassignment path a while
/// after it appears.
fn spawn_controller(store: Arc<InMemoryCoordinationStore>, work: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !store.exists_now(REASSIGN_PARTITIONS_PATH) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tokio::time::sleep(work).await;
        store.delete(REASSIGN_PARTITIONS_PATH);
    })
}

#[tokio::test]
async fn test_reassignment_waits_for_controller() {
    let kafka = KafkaHarness::new(json!([])).await;
    kafka.admin.put_topic(topic("events", 2, 2, &[]));
    let controller = spawn_controller(Arc::clone(&kafka.store), Duration::from_millis(50));

    let action = kafka
        .dispatch_and_wait(ReassignmentAction::builder(&move_partition_zero()))
        .await;
    controller.await.unwrap();

    assert_eq!(action.state(), ActionState::Succeeded, "{:?}", action.error());
    let polls = action.result(POLL_COUNT).and_then(|v| v.as_u64()).unwrap();
    assert!(polls >= 2, "expected repeated polling, got {polls}");

    let plans = kafka.admin.reassignments();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].partitions[0].replicas, vec![3, 1]);
    assert_eq!(kafka.admin.topic("events").unwrap().partitions[0].replicas, vec![3, 1]);
    assert!(!kafka.store.exists_now(REASSIGN_PARTITIONS_PATH));
}

#[tokio::test]
async fn test_running_reassignment_rejects_new_one() {
    let kafka = KafkaHarness::new(json!([])).await;
    kafka.admin.put_topic(topic("events", 2, 2, &[]));
    assert!(kafka.store.create(REASSIGN_PARTITIONS_PATH, Vec::new()));

    let action = kafka
        .dispatch_and_wait(ReassignmentAction::builder(&move_partition_zero()))
        .await;

    assert_eq!(action.state(), ActionState::Failed);
    assert!(action.error().unwrap().contains("Reassignment already running"));
    assert!(kafka.admin.reassignments().is_empty());
    assert_eq!(kafka.admin.topic("events").unwrap().partitions[0].replicas, vec![1, 2]);
}

#[tokio::test]
async fn test_reassignment_queues_behind_previous() {
    let kafka = KafkaHarness::new(json!([])).await;
    kafka.admin.put_topic(topic("events", 2, 2, &[]));
    assert!(kafka.store.create(REASSIGN_PARTITIONS_PATH, Vec::new()));

    let cluster = &kafka.harness.cluster;
    let outcome = cluster
        .engine()
        .dispatch(
            cluster,
            ReassignmentAction::builder(&move_partition_zero())
                .parameter(ReassignmentAction::WAIT_FOR_PREVIOUS, true)
                .owner(crate::common::TEST_OWNER)
                .build(),
        )
        .await
        .unwrap();
    let action = Arc::clone(outcome.action().unwrap());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(action.state(), ActionState::Running);
    assert!(kafka.admin.reassignments().is_empty());

    // The earlier reassignment finishes; ours is submitted and then completes.
    kafka.store.delete(REASSIGN_PARTITIONS_PATH);
    let controller = spawn_controller(Arc::clone(&kafka.store), Duration::from_millis(20));

    assert_eq!(action.wait_for_completion().await, ActionState::Succeeded);
    controller.await.unwrap();
    assert_eq!(kafka.admin.reassignments().len(), 1);
}

#[tokio::test]
async fn test_reassignment_bounded_by_max_wait() {
    let kafka = KafkaHarness::new(json!([])).await;
    kafka.admin.put_topic(topic("events", 2, 2, &[]));

    let action = kafka
        .dispatch_and_wait(
            ReassignmentAction::builder(&move_partition_zero()).parameter(ReassignmentAction::MAX_WAIT_MS, 40),
        )
        .await;

    assert_eq!(action.state(), ActionState::Failed);
    let error = action.error().unwrap();
    assert!(error.contains("waiting for deletion of /admin/reassign_partitions"), "{error}");
    // The submission itself went through; only the wait gave up.
    assert_eq!(kafka.admin.reassignments().len(), 1);
}

#[tokio::test]
async fn test_queued_reassignment_bounded_by_max_wait() {
    let kafka = KafkaHarness::new(json!([])).await;
    kafka.admin.put_topic(topic("events", 2, 2, &[]));
    assert!(kafka.store.create(REASSIGN_PARTITIONS_PATH, Vec::new()));

    let action = kafka
        .dispatch_and_wait(
            ReassignmentAction::builder(&move_partition_zero())
                .parameter(ReassignmentAction::WAIT_FOR_PREVIOUS, true)
                .parameter(ReassignmentAction::MAX_WAIT_MS, 40),
        )
        .await;

    assert_eq!(action.state(), ActionState::Failed);
    let error = action.error().unwrap();
    assert!(error.contains("waiting for deletion of /admin/reassign_partitions"), "{error}");
    // The previous reassignment never finished, so ours was never submitted.
    assert!(kafka.admin.reassignments().is_empty());
    assert!(kafka.store.exists_now(REASSIGN_PARTITIONS_PATH));
}

#[tokio::test]
async fn test_unreachable_coordination_fails_reassignment() {
    let store = Arc::new(InMemoryCoordinationStore::new());
    let kafka = KafkaHarness::with_connector(
        json!([]),
        Arc::clone(&store),
        InMemoryConnector::unreachable("zk-kafka-1:2181"),
    )
    .await;
    kafka.admin.put_topic(topic("events", 2, 2, &[]));

    let action = kafka
        .dispatch_and_wait(ReassignmentAction::builder(&move_partition_zero()))
        .await;

    assert_eq!(action.state(), ActionState::Failed);
    assert!(action
        .error()
        .unwrap()
        .contains("'zk-kafka-1:2181' unreachable after 3 attempts"));
    assert!(kafka.admin.reassignments().is_empty());
}

#[tokio::test]
async fn test_empty_reassignment_is_rejected() {
    let kafka = KafkaHarness::new(json!([])).await;

    let action = kafka
        .dispatch_and_wait(ReassignmentAction::builder(&BTreeMap::new()))
        .await;

    assert_eq!(action.state(), ActionState::Failed);
    assert!(action.error().unwrap().contains("reassignment has no partitions"));
}
