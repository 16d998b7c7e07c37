use crate::common::{test_action, test_cluster_config, Harness, ScriptedHandler, TEST_OWNER};
use async_trait::async_trait;
use orion_automation::action::{Action, ActionContext, ActionHandler, ActionState, ActionType, ChildPolicy};
use orion_automation::error::ActionError;
use std::sync::Arc;

const CHILD: &str = "child_step";

/// Runs one child under the given policy and records its terminal state
struct ParentHandler {
    child: Arc<dyn ActionHandler>,
    policy: ChildPolicy,
}

impl ParentHandler {
    fn new(child: Arc<dyn ActionHandler>, policy: ChildPolicy) -> Arc<Self> {
        Arc::new(Self { child, policy })
    }
}

#[async_trait]
impl ActionHandler for ParentHandler {
    fn description(&self) -> &'static str {
        "parent test handler"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let child = Action::builder(CHILD, ActionType::Cluster, Arc::clone(&self.child)).build();
        let state = ctx.dispatch_child(child, self.policy).await?;
        ctx.set_result("child_state", &state)
    }
}

fn failing_child() -> Arc<ScriptedHandler> {
    ScriptedHandler::with_script(vec![Err(ActionError::external("broker", "config rejected"))])
}

#[tokio::test]
async fn test_failed_child_fails_parent() {
    let harness = Harness::new().await;
    let parent = test_action("parent", ParentHandler::new(failing_child(), ChildPolicy::FailParent)).build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, parent)
        .await
        .unwrap();
    let parent = outcome.action().unwrap();

    assert_eq!(parent.state(), ActionState::Failed);
    let error = parent.error().unwrap();
    assert!(error.contains("Child action 'child_step' failed"));
    assert!(error.contains("config rejected"));

    let children = harness.cluster.engine().children_of(parent.id());
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].state(), ActionState::Failed);
    assert_eq!(parent.children()[0].policy, ChildPolicy::FailParent);
}

#[tokio::test]
async fn test_ignored_child_failure_lets_parent_succeed() {
    let harness = Harness::new().await;
    let parent = test_action("parent", ParentHandler::new(failing_child(), ChildPolicy::Ignore)).build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, parent)
        .await
        .unwrap();
    let parent = outcome.action().unwrap();

    assert_eq!(parent.state(), ActionState::Succeeded);
    assert_eq!(parent.result("child_state"), Some(serde_json::json!("failed")));
}

#[tokio::test]
async fn test_child_inherits_owner_and_parent() {
    let harness = Harness::new().await;
    let parent = test_action(
        "parent",
        ParentHandler::new(ScriptedHandler::succeeding(), ChildPolicy::FailParent),
    )
    .build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, parent)
        .await
        .unwrap();
    let parent = outcome.action().unwrap();
    assert_eq!(parent.state(), ActionState::Succeeded);

    let child = &harness.cluster.engine().children_of(parent.id())[0];
    assert_eq!(child.name(), CHILD);
    assert_eq!(child.owner(), Some(TEST_OWNER));
    assert_eq!(child.parent(), Some(parent.id()));
    assert_eq!(child.state(), ActionState::Succeeded);
    assert_eq!(harness.cluster.engine().descendants(parent.id()).len(), 1);

    let child_audits = harness.auditor.events_for(child.id());
    assert!(child_audits.iter().all(|event| event.parent_id == Some(parent.id())));
}

#[tokio::test]
async fn test_disabled_child_fails_parent() {
    let mut config = test_cluster_config();
    config.enabled_actions = Some(vec!["parent".to_string()]);
    let harness = Harness::with_config(config).await;
    let child = ScriptedHandler::succeeding();
    let parent = test_action("parent", ParentHandler::new(child.clone(), ChildPolicy::FailParent)).build();

    let outcome = harness
        .cluster
        .engine()
        .dispatch_and_wait(&harness.cluster, parent)
        .await
        .unwrap();
    let parent = outcome.action().unwrap();

    assert_eq!(parent.state(), ActionState::Failed);
    assert!(parent.error().unwrap().contains("not enabled"));
    assert_eq!(child.calls(), 0);
}
