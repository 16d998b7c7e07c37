use crate::common::{test_action, Harness, PanickingHandler, ScriptedHandler, TEST_OWNER};
use orion_automation::action::ActionState;
use orion_automation::alert::AlertLevel;
use orion_automation::error::ActionError;
use orion_automation::retry::RetryPolicy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let harness = Harness::new().await;
    let handler = ScriptedHandler::with_script(vec![
        Err(ActionError::transient("broker", "leader not available")),
        Err(ActionError::transient("broker", "leader not available")),
    ]);
    let action = test_action("rebalance", handler.clone())
        .retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
        .build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.state(), ActionState::Succeeded);
    assert_eq!(action.attempts(), 3);
    assert_eq!(handler.calls(), 3);
    assert_eq!(action.result("attempt"), Some(json!(3)));
    assert!(action.error().is_none());

    let failed_attempts = harness
        .auditor
        .events_for(action.id())
        .iter()
        .filter(|event| event.is_failed_attempt())
        .count();
    assert_eq!(failed_attempts, 2);
}

#[tokio::test]
async fn test_retry_budget_exhausted_fails_action() {
    let harness = Harness::new().await;
    let handler = ScriptedHandler::with_script(vec![
        Err(ActionError::transient("broker", "timeout")),
        Err(ActionError::transient("broker", "timeout")),
        Err(ActionError::transient("broker", "still timing out")),
    ]);
    let action = test_action("rebalance", handler.clone())
        .retry_policy(RetryPolicy::new(2, Duration::from_millis(1)))
        .build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.state(), ActionState::Failed);
    assert_eq!(handler.calls(), 2);
    assert!(action.error().unwrap().contains("timeout"));
}

#[tokio::test]
async fn test_non_retryable_error_fails_after_one_attempt() {
    let harness = Harness::new().await;
    let handler = ScriptedHandler::with_script(vec![Err(ActionError::precondition("broker 7 is the controller"))]);
    let action = test_action("drain", handler.clone())
        .retry_policy(RetryPolicy::new(5, Duration::from_millis(1)))
        .build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.state(), ActionState::Failed);
    assert_eq!(action.attempts(), 1);
    assert_eq!(handler.calls(), 1);
    assert!(action.error().unwrap().contains("broker 7 is the controller"));

    harness.wait_for_alert("Action drain failed").await;
    let failure = harness
        .alerts
        .alerts_at(AlertLevel::Medium)
        .into_iter()
        .find(|alert| alert.title == "Action drain failed")
        .unwrap();
    assert_eq!(failure.owner, TEST_OWNER);
    assert_eq!(failure.cluster_id.as_deref(), Some("test-1"));
}

#[tokio::test]
async fn test_panicking_work_function_fails_action() {
    let harness = Harness::new().await;
    let action = test_action("explode", Arc::new(PanickingHandler))
        .retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
        .build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.state(), ActionState::Failed);
    assert_eq!(action.attempts(), 1);
    assert!(action.error().unwrap().contains("panicked"));

    // The engine survives and keeps serving dispatches.
    let next = test_action("explode", ScriptedHandler::succeeding()).build();
    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, next)
        .await
        .unwrap();
    assert_eq!(outcome.action().unwrap().state(), ActionState::Succeeded);
}

#[tokio::test]
async fn test_deadline_exceeded_fails_action() {
    let harness = Harness::new().await;
    let handler = ScriptedHandler::slow(Duration::from_secs(30));
    let action = test_action("slow_restart", handler)
        .deadline(Duration::from_millis(50))
        .build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(action.state(), ActionState::Failed);
    assert!(action.error().unwrap().contains("Timed out after 50ms"));
}

#[tokio::test]
async fn test_failing_success_hook_fails_action() {
    let harness = Harness::new().await;
    let handler = ScriptedHandler::failing_hook(ActionError::external("pager", "rejected"));
    let action = test_action("announce", handler.clone()).build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, action)
        .await
        .unwrap();
    let action = outcome.action().unwrap();

    assert_eq!(handler.calls(), 1);
    assert_eq!(action.state(), ActionState::Failed);
    let error = action.error().unwrap();
    assert!(error.contains("Success hook failed"));
    assert!(error.contains("rejected"));
}
