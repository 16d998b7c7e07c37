use super::record::Action;
use super::states::{ActionState, ChildPolicy};
use crate::alert::{AlertLevel, AlertMessage};
use crate::cluster::{Cluster, Node};
use crate::error::ActionError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Parameter naming the node a node action targets
pub const NODE_ID_PARAMETER: &str = "node_id";

/// The work an action performs
///
/// `run` may be invoked again after a retryable failure, so implementations
/// should tolerate re-execution of partially completed work.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn description(&self) -> &'static str;

    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError>;

    /// Runs after `run` succeeds; an error here fails the action
    async fn on_succeeded(&self, _ctx: &ActionContext) -> Result<(), ActionError> {
        Ok(())
    }
}

/// What a running handler can see and do
#[derive(Clone)]
pub struct ActionContext {
    action: Arc<Action>,
    cluster: Arc<Cluster>,
    attempt: u32,
}

impl ActionContext {
    pub(crate) fn new(action: Arc<Action>, cluster: Arc<Cluster>, attempt: u32) -> Self {
        Self {
            action,
            cluster,
            attempt,
        }
    }

    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn parameter<T: DeserializeOwned>(&self, key: &str) -> Result<T, ActionError> {
        self.action.parameter_as(key)
    }

    pub fn optional_parameter<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ActionError> {
        match self.action.parameter(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(_) => self.parameter(key).map(Some),
        }
    }

    /// Record a result attribute on the running action
    pub fn set_result<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ActionError> {
        let value =
            serde_json::to_value(value).map_err(|e| ActionError::invalid_attribute(key, e.to_string()))?;
        self.action.set_result(key, value)
    }

    /// The node named by the `node_id` parameter
    pub fn node(&self) -> Result<Arc<Node>, ActionError> {
        let node_id: String = self.parameter(NODE_ID_PARAMETER)?;
        self.cluster.node(&node_id).ok_or_else(|| {
            ActionError::precondition(format!(
                "node {node_id} is not part of cluster {}",
                self.cluster.id()
            ))
        })
    }

    /// Dispatch `child` under this action and wait for it
    ///
    /// With [`ChildPolicy::FailParent`] a failed child is returned as an
    /// error; with [`ChildPolicy::Ignore`] its terminal state is returned.
    pub async fn dispatch_child(&self, child: Action, policy: ChildPolicy) -> Result<ActionState, ActionError> {
        self.cluster
            .engine()
            .run_child(&self.cluster, &self.action, child, policy)
            .await
    }

    /// Fire-and-forget alert tagged with this action
    pub async fn raise_alert(&self, level: AlertLevel, title: impl Into<String>, body: impl Into<String>) {
        let alert = self.alert(level, title, body);
        self.cluster.raise_alert(alert).await;
    }

    /// Deliver an alert and fail if any sink rejects it
    pub async fn notify(&self, level: AlertLevel, title: impl Into<String>, body: impl Into<String>) -> Result<(), ActionError> {
        let alert = self.alert(level, title, body);
        self.cluster
            .notify(alert)
            .await
            .map_err(|e| ActionError::hook_failed(format!("notification failed: {e}")))
    }

    fn alert(&self, level: AlertLevel, title: impl Into<String>, body: impl Into<String>) -> AlertMessage {
        let mut alert = AlertMessage::new(level, title, body)
            .for_cluster(self.cluster.id())
            .with_context(json!({
                "action_id": self.action.id().to_string(),
                "action_name": self.action.name(),
                "attempt": self.attempt,
            }));
        if let Some(owner) = self.action.owner() {
            alert = alert.with_owner(owner);
        }
        alert
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.action.id())
            .field("cluster", &self.cluster.id())
            .field("attempt", &self.attempt)
            .finish()
    }
}
