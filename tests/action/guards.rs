use crate::common::{
    fast_actions, fast_automation, test_action, test_cluster_config, GatedHandler, Harness, ScriptedHandler,
    TestPlugin,
};
use async_trait::async_trait;
use futures::future::join_all;
use orion_automation::action::{Action, ActionState, ActionType, DispatchOutcome};
use orion_automation::alert::AlertLevel;
use orion_automation::audit::{ActionAuditor, AuditError, AuditEvent};
use orion_automation::cluster::Cluster;
use orion_automation::error::OrionError;
use std::sync::Arc;
use std::time::Duration;

/// Auditor that takes a while to acknowledge each record
struct SlowAuditor(Duration);

#[async_trait]
impl ActionAuditor for SlowAuditor {
    async fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_dispatch_without_owner_is_rejected() {
    let harness = Harness::new().await;
    let action = Action::builder("rebalance", ActionType::Cluster, ScriptedHandler::succeeding()).build();

    let err = harness
        .cluster
        .engine()
        .dispatch(&harness.cluster, action)
        .await
        .unwrap_err();

    assert!(matches!(err, OrionError::InvalidAction { ref action, .. } if action == "rebalance"));
    assert_eq!(harness.cluster.engine().tracked_count(), 0);
}

#[tokio::test]
async fn test_blank_owner_is_rejected() {
    let harness = Harness::new().await;
    let action = Action::builder("rebalance", ActionType::Cluster, ScriptedHandler::succeeding())
        .owner("  ")
        .build();

    let result = harness.cluster.engine().dispatch(&harness.cluster, action).await;
    assert!(matches!(result, Err(OrionError::InvalidAction { .. })));
}

#[tokio::test]
async fn test_disabled_action_is_not_run() {
    let mut config = test_cluster_config();
    config.enabled_actions = Some(vec!["restart".to_string()]);
    let harness = Harness::with_config(config).await;
    let handler = ScriptedHandler::succeeding();

    let outcome = harness
        .cluster
        .engine()
        .dispatch(&harness.cluster, test_action("rebalance", handler.clone()).build())
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Disabled { ref action } if action == "rebalance"));
    assert_eq!(handler.calls(), 0);
    assert_eq!(harness.cluster.engine().tracked_count(), 0);

    let blocked = harness.alerts.alerts_at(AlertLevel::Medium);
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].title, "Action rebalance blocked");
}

#[tokio::test]
async fn test_enabled_action_runs_when_allow_list_names_it() {
    let mut config = test_cluster_config();
    config.enabled_actions = Some(vec!["restart".to_string()]);
    let harness = Harness::with_config(config).await;

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, test_action("restart", ScriptedHandler::succeeding()).build())
        .await
        .unwrap();

    assert_eq!(outcome.action().unwrap().state(), ActionState::Succeeded);
}

#[tokio::test]
async fn test_concurrent_equivalent_dispatches_admit_exactly_one() {
    let harness = Harness::new().await;
    let gate = GatedHandler::new();
    let engine = harness.cluster.engine();

    let dispatches = (0..16).map(|_| {
        let action = test_action("replace", gate.clone())
            .parameter("node_id", "broker-3")
            .identity_keys(["node_id"])
            .build();
        engine.dispatch(&harness.cluster, action)
    });
    let outcomes: Vec<DispatchOutcome> = join_all(dispatches)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let admitted: Vec<_> = outcomes.iter().filter_map(DispatchOutcome::action).collect();
    assert_eq!(admitted.len(), 1);
    let winner = admitted[0].id();
    for outcome in &outcomes {
        if let DispatchOutcome::Duplicate { existing, .. } = outcome {
            assert_eq!(*existing, winner);
        } else {
            assert!(outcome.is_dispatched());
        }
    }

    gate.open();
    assert_eq!(admitted[0].wait_for_completion().await, ActionState::Succeeded);
    assert_eq!(gate.started(), 1);
}

#[tokio::test]
async fn test_equivalent_action_admitted_after_completion() {
    let harness = Harness::new().await;
    let engine = harness.cluster.engine();
    let build = || {
        test_action("replace", ScriptedHandler::succeeding())
            .parameter("node_id", "broker-3")
            .identity_keys(["node_id"])
            .build()
    };

    let first = engine.dispatch_and_wait(&harness.cluster, build()).await.unwrap();
    assert_eq!(first.action().unwrap().state(), ActionState::Succeeded);

    let second = engine.dispatch_and_wait(&harness.cluster, build()).await.unwrap();
    assert!(second.is_dispatched());
    assert_ne!(first.action().unwrap().id(), second.action().unwrap().id());
}

#[tokio::test]
async fn test_chained_equivalent_action_admitted_while_audit_is_slow() {
    let cluster = Cluster::builder(test_cluster_config(), Arc::new(TestPlugin::default()))
        .automation(fast_automation())
        .actions(fast_actions())
        .auditor(Arc::new(SlowAuditor(Duration::from_millis(50))))
        .build()
        .await
        .unwrap();
    let engine = cluster.engine();
    let chain = || test_action("chain", ScriptedHandler::succeeding()).build();

    let first = engine.dispatch_and_wait(&cluster, chain()).await.unwrap();
    assert_eq!(first.action().unwrap().state(), ActionState::Succeeded);
    assert!(engine.in_flight().is_empty());

    let second = engine.dispatch(&cluster, chain()).await.unwrap();
    assert!(second.is_dispatched(), "got {}", second.label());
    assert_eq!(second.action().unwrap().wait_for_completion().await, ActionState::Succeeded);
}

#[tokio::test]
async fn test_different_identity_parameters_are_not_equivalent() {
    let harness = Harness::new().await;
    let gate = GatedHandler::new();
    let engine = harness.cluster.engine();
    let replace = |node: &str| {
        test_action("replace", gate.clone())
            .parameter("node_id", node)
            .parameter("requested_by", "oncall")
            .identity_keys(["node_id"])
            .build()
    };

    let a = engine.dispatch(&harness.cluster, replace("broker-1")).await.unwrap();
    let b = engine.dispatch(&harness.cluster, replace("broker-2")).await.unwrap();
    assert!(a.is_dispatched());
    assert!(b.is_dispatched());
    assert_eq!(engine.in_flight().len(), 2);

    gate.open();
    for outcome in [a, b] {
        assert_eq!(outcome.action().unwrap().wait_for_completion().await, ActionState::Succeeded);
    }
}

#[tokio::test]
async fn test_non_identity_parameters_do_not_distinguish_actions() {
    let harness = Harness::new().await;
    let gate = GatedHandler::new();
    let engine = harness.cluster.engine();
    let replace = |reason: &str| {
        test_action("replace", gate.clone())
            .parameter("node_id", "broker-1")
            .parameter("reason", reason)
            .identity_keys(["node_id"])
            .build()
    };

    let first = engine.dispatch(&harness.cluster, replace("disk")).await.unwrap();
    let second = engine.dispatch(&harness.cluster, replace("network")).await.unwrap();

    assert!(first.is_dispatched());
    assert!(matches!(second, DispatchOutcome::Duplicate { .. }));
    gate.open();
    first.action().unwrap().wait_for_completion().await;
}

#[tokio::test]
async fn test_dispatch_raises_low_alert() {
    let harness = Harness::new().await;

    harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, test_action("restart", ScriptedHandler::succeeding()).build())
        .await
        .unwrap();

    let dispatched = harness.alerts.alerts_at(AlertLevel::Low);
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].title, "Action restart dispatched");
}

#[tokio::test]
async fn test_failing_auditor_never_blocks_action() {
    let harness = Harness::new().await;
    harness.auditor.set_failing(true);

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(
            &harness.cluster,
            test_action("restart", ScriptedHandler::slow(Duration::from_millis(5))).build(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.action().unwrap().state(), ActionState::Succeeded);
    assert!(harness.auditor.events().is_empty());
}
