//! The action unit itself: immutable definition plus its lifecycle record.

use super::events::ActionEvent;
use super::handler::ActionHandler;
use super::lifecycle::{ChildHandle, LifecycleSnapshot, Transition};
use super::registry::{EquivalenceKey, Reservation};
use super::states::{ActionState, ActionType};
use crate::error::{ActionError, OrionResult};
use crate::identity::ActionId;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A unit of remediation work dispatched against a cluster
pub struct Action {
    id: ActionId,
    name: String,
    action_type: ActionType,
    owner: Option<String>,
    parameters: BTreeMap<String, Value>,
    identity_keys: Option<BTreeSet<String>>,
    retry_policy: Option<RetryPolicy>,
    deadline: Option<Duration>,
    post_run_sensors: Vec<String>,
    parent: Option<ActionId>,
    handler: Arc<dyn ActionHandler>,
    record: RwLock<LifecycleSnapshot>,
    state_tx: watch::Sender<ActionState>,
}

impl Action {
    pub fn builder(
        name: impl Into<String>,
        action_type: ActionType,
        handler: Arc<dyn ActionHandler>,
    ) -> ActionBuilder {
        ActionBuilder {
            name: name.into(),
            action_type,
            handler,
            owner: None,
            parameters: BTreeMap::new(),
            identity_keys: None,
            retry_policy: None,
            deadline: None,
            post_run_sensors: Vec::new(),
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Decode a parameter into `T`
    pub fn parameter_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ActionError> {
        let value = self
            .parameters
            .get(key)
            .ok_or_else(|| ActionError::missing_attribute(key))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ActionError::invalid_attribute(key, e.to_string()))
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn post_run_sensors(&self) -> &[String] {
        &self.post_run_sensors
    }

    pub fn parent(&self) -> Option<ActionId> {
        self.parent
    }

    pub fn handler(&self) -> &Arc<dyn ActionHandler> {
        &self.handler
    }

    /// Name, type and the identifying subset of parameters
    pub fn equivalence_key(&self) -> EquivalenceKey {
        let identity: BTreeMap<&String, &Value> = match &self.identity_keys {
            Some(keys) => self
                .parameters
                .iter()
                .filter(|(key, _)| keys.contains(*key))
                .collect(),
            None => self.parameters.iter().collect(),
        };
        // serde_json maps are ordered, so nested objects serialize canonically too.
        let attributes = serde_json::to_string(&identity).unwrap_or_default();
        EquivalenceKey::new(self.name.clone(), self.action_type, attributes)
    }

    /// Two actions are the same work when their equivalence keys match
    pub fn is_same_as(&self, other: &Action) -> bool {
        self.equivalence_key() == other.equivalence_key()
    }

    /// Consistent copy of the lifecycle record
    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.record.read().clone()
    }

    pub fn state(&self) -> ActionState {
        self.record.read().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn error(&self) -> Option<String> {
        self.record.read().error.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.record.read().attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.read().created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.record.read().completed_at
    }

    pub fn results(&self) -> BTreeMap<String, Value> {
        self.record.read().results.clone()
    }

    pub fn result(&self, key: &str) -> Option<Value> {
        self.record.read().results.get(key).cloned()
    }

    pub fn children(&self) -> Vec<ChildHandle> {
        self.record.read().children.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ActionState> {
        self.state_tx.subscribe()
    }

    /// Resolves once the action reaches a terminal state
    pub async fn wait_for_completion(&self) -> ActionState {
        let mut receiver = self.state_tx.subscribe();
        let state = match receiver.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives inside `self`, so this only happens mid-drop.
            Err(_) => self.state(),
        };
        state
    }

    pub(crate) fn apply(&self, event: &ActionEvent) -> OrionResult<Transition> {
        self.apply_releasing(event, None)
    }

    /// Apply a terminal `event` and free the in-flight slot under the same lock
    ///
    /// Anyone who observes the terminal state also observes the slot as free.
    pub(crate) fn settle(&self, event: &ActionEvent, reservation: Reservation) -> OrionResult<Transition> {
        self.apply_releasing(event, Some(reservation))
    }

    fn apply_releasing(&self, event: &ActionEvent, reservation: Option<Reservation>) -> OrionResult<Transition> {
        let transition = {
            let mut record = self.record.write();
            let transition = record.apply(event, Utc::now())?;
            drop(reservation);
            transition
        };
        self.state_tx.send_replace(transition.to);
        Ok(transition)
    }

    /// Results are writable only until the action is terminal
    pub(crate) fn set_result(&self, key: impl Into<String>, value: Value) -> Result<(), ActionError> {
        let mut record = self.record.write();
        if record.state.is_terminal() {
            return Err(ActionError::Frozen {
                action_id: self.id.to_string(),
            });
        }
        record.results.insert(key.into(), value);
        Ok(())
    }

    pub(crate) fn add_child(&self, child: ChildHandle) {
        self.record.write().children.push(child);
    }

    pub(crate) fn adopt(&mut self, parent: &Action) {
        self.parent = Some(parent.id);
        if self.owner.is_none() {
            self.owner = parent.owner.clone();
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("action_type", &self.action_type)
            .field("owner", &self.owner)
            .field("state", &self.state())
            .field("parent", &self.parent)
            .finish()
    }
}

pub struct ActionBuilder {
    name: String,
    action_type: ActionType,
    handler: Arc<dyn ActionHandler>,
    owner: Option<String>,
    parameters: BTreeMap<String, Value>,
    identity_keys: Option<BTreeSet<String>>,
    retry_policy: Option<RetryPolicy>,
    deadline: Option<Duration>,
    post_run_sensors: Vec<String>,
}

impl ActionBuilder {
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Restrict the equivalence key to these parameters
    pub fn identity_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sensors re-run after a successful run so the next decision sees its effect
    pub fn post_run_sensors<I, S>(mut self, sensors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_run_sensors = sensors.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Action {
        let id = ActionId::new();
        let (state_tx, _) = watch::channel(ActionState::Pending);
        Action {
            id,
            name: self.name,
            action_type: self.action_type,
            owner: self.owner,
            parameters: self.parameters,
            identity_keys: self.identity_keys,
            retry_policy: self.retry_policy,
            deadline: self.deadline,
            post_run_sensors: self.post_run_sensors,
            parent: None,
            handler: self.handler,
            record: RwLock::new(LifecycleSnapshot::new(id.timestamp())),
            state_tx,
        }
    }
}
