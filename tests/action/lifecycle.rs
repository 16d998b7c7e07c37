use crate::common::{test_action, wait_until, Harness, ScriptedHandler};
use async_trait::async_trait;
use chrono::Utc;
use orion_automation::action::ActionState;
use orion_automation::automation::Sensor;
use orion_automation::cluster::Cluster;
use orion_automation::constants::results::POST_RUN_WARNING;
use orion_automation::error::ObservationError;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Publishes how many times it has observed
#[derive(Default)]
struct CountingSensor {
    passes: AtomicU32,
}

#[async_trait]
impl Sensor for CountingSensor {
    fn name(&self) -> &str {
        "counting"
    }

    async fn observe(&self, cluster: &Cluster) -> Result<(), ObservationError> {
        let passes = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        cluster.attributes().set("passes", json!(passes), self.name());
        Ok(())
    }
}

#[tokio::test]
async fn test_audit_trail_records_every_transition() {
    let harness = Harness::new().await;

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, test_action("restart", ScriptedHandler::succeeding()).build())
        .await
        .unwrap();
    let action = outcome.action().unwrap();
    // The terminal transition is audited right after it is published.
    wait_until(Duration::from_secs(5), || harness.auditor.events_for(action.id()).len() == 2).await;

    let trail = harness.auditor.events_for(action.id());
    let steps: Vec<_> = trail
        .iter()
        .map(|event| (event.event_type.as_str(), event.from_state, event.to_state))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("start", ActionState::Pending, ActionState::Running),
            ("succeed", ActionState::Running, ActionState::Succeeded),
        ]
    );
    assert!(trail.iter().all(|event| event.cluster_id == "test-1"));

    let snapshot = action.snapshot();
    assert!(snapshot.started_at.is_some());
    assert!(snapshot.completed_at >= snapshot.started_at);
}

#[tokio::test]
async fn test_post_run_sensors_refresh_attributes() {
    let harness = Harness::new().await;
    harness.cluster.register_sensor(Arc::new(CountingSensor::default()));

    let action = test_action("restart", ScriptedHandler::succeeding())
        .post_run_sensors(["counting"])
        .build();
    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.state(), ActionState::Succeeded);
    assert_eq!(harness.cluster.attributes().value("passes"), Some(json!(1)));
    assert!(action.result(POST_RUN_WARNING).is_none());
}

#[tokio::test]
async fn test_unknown_post_run_sensor_is_reported_not_fatal() {
    let harness = Harness::new().await;
    let action = test_action("restart", ScriptedHandler::succeeding())
        .post_run_sensors(["does_not_exist"])
        .build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.state(), ActionState::Succeeded);
    let warning = action.result(POST_RUN_WARNING).unwrap();
    assert!(warning.as_str().unwrap().contains("does_not_exist"));
}

#[tokio::test]
async fn test_success_records_handler_results() {
    let harness = Harness::new().await;

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, test_action("restart", ScriptedHandler::succeeding()).build())
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.results().len(), 1);
    assert_eq!(action.result("attempt"), Some(json!(1)));
    assert!(action.is_terminal());
}

#[tokio::test]
async fn test_actions_listed_newest_first_and_expire() {
    let harness = Harness::new().await;
    let engine = harness.cluster.engine();

    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        let outcome = engine
            .dispatch_and_wait(&harness.cluster, test_action(name, ScriptedHandler::succeeding()).build())
            .await
            .unwrap();
        ids.push(outcome.action().unwrap().id());
        // Ids order by creation millisecond.
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    let listed: Vec<_> = engine.actions().iter().map(|action| action.name().to_string()).collect();
    assert_eq!(listed, vec!["third", "second", "first"]);
    assert!(engine.active_actions().is_empty());
    assert!(engine.action(ids[0]).is_some());

    assert_eq!(engine.cleanup_expired(), 0);
    assert_eq!(engine.cleanup_completed_before(Utc::now() + chrono::Duration::seconds(1)), 3);
    assert_eq!(engine.tracked_count(), 0);
    assert!(engine.action(ids[0]).is_none());
}
