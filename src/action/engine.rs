//! # Action Engine
//!
//! Owns every tracked action of one cluster and runs them.
//!
//! Dispatch applies the guards in a fixed order:
//!
//! 1. the action must carry an owner (an error, not an outcome)
//! 2. the cluster must allow the action name
//! 3. no equivalent action may be in flight (CAS reservation)
//! 4. no configured conflict detector may report a blocking conflict
//!
//! The reservation taken in step 3 is held while the conflict check runs and
//! for the whole execution. It is released together with the terminal state
//! transition, so a caller that waited for completion can dispatch an
//! equivalent action straight away.
//! Guard decisions are reported as [`DispatchOutcome`]s.

use super::events::ActionEvent;
use super::handler::ActionContext;
use super::lifecycle::{ChildHandle, Transition};
use super::record::Action;
use super::registry::{InFlightRegistry, Reservation};
use super::states::{ActionState, ChildPolicy};
use crate::alert::{AlertLevel, AlertMessage};
use crate::audit::{ActionAuditor, AuditEvent};
use crate::cluster::Cluster;
use crate::config::ActionsConfig;
use crate::conflict::ConflictDetectors;
use crate::constants::results::POST_RUN_WARNING;
use crate::error::{ActionError, OrionError, OrionResult};
use crate::identity::ActionId;
use crate::logging::log_action_operation;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of a dispatch attempt
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Accepted and scheduled
    Dispatched(Arc<Action>),
    /// An equivalent action is already in flight
    Duplicate { action: String, existing: ActionId },
    /// A conflict detector reported an unsafe change
    Blocked {
        action: String,
        conflict: String,
        subject: String,
        reason: String,
    },
    /// The cluster does not allow this action
    Disabled { action: String },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched(_))
    }

    pub fn action(&self) -> Option<&Arc<Action>> {
        match self {
            Self::Dispatched(action) => Some(action),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dispatched(_) => "dispatched",
            Self::Duplicate { .. } => "duplicate",
            Self::Blocked { .. } => "blocked",
            Self::Disabled { .. } => "disabled",
        }
    }
}

pub struct ActionEngine {
    cluster_id: String,
    config: ActionsConfig,
    post_run_sensor_timeout: Duration,
    tracked: DashMap<ActionId, Arc<Action>>,
    in_flight: Arc<InFlightRegistry>,
    auditor: Arc<dyn ActionAuditor>,
}

impl ActionEngine {
    pub fn new(
        cluster_id: impl Into<String>,
        config: ActionsConfig,
        post_run_sensor_timeout: Duration,
        auditor: Arc<dyn ActionAuditor>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            config,
            post_run_sensor_timeout,
            tracked: DashMap::new(),
            in_flight: Arc::new(InFlightRegistry::new()),
            auditor,
        }
    }

    pub fn config(&self) -> &ActionsConfig {
        &self.config
    }

    pub fn auditor(&self) -> &Arc<dyn ActionAuditor> {
        &self.auditor
    }

    pub fn in_flight(&self) -> &Arc<InFlightRegistry> {
        &self.in_flight
    }

    /// Dispatch without conflict detection
    pub async fn dispatch(&self, cluster: &Arc<Cluster>, action: Action) -> OrionResult<DispatchOutcome> {
        self.dispatch_guarded(cluster, action, &ConflictDetectors::none(), "")
            .await
    }

    /// Dispatch after consulting `detectors` about `subject`
    pub async fn dispatch_guarded(
        &self,
        cluster: &Arc<Cluster>,
        action: Action,
        detectors: &ConflictDetectors,
        subject: &str,
    ) -> OrionResult<DispatchOutcome> {
        let name = action.name().to_string();

        if action.owner().map_or(true, |owner| owner.trim().is_empty()) {
            return Err(OrionError::invalid_action(name, "an owner is required to dispatch"));
        }

        if !cluster.is_action_enabled(&name) {
            warn!(cluster_id = %self.cluster_id, action = %name, "Action is not enabled for this cluster");
            cluster
                .raise_alert(
                    AlertMessage::new(
                        AlertLevel::Medium,
                        format!("Action {name} blocked"),
                        format!("{name} is not enabled for cluster {}", self.cluster_id),
                    )
                    .for_cluster(&self.cluster_id),
                )
                .await;
            return Ok(DispatchOutcome::Disabled { action: name });
        }

        let reservation = match self.in_flight.try_reserve(action.equivalence_key(), action.id()) {
            Ok(reservation) => reservation,
            Err(existing) => {
                debug!(
                    cluster_id = %self.cluster_id,
                    action = %name,
                    existing = %existing,
                    "Equivalent action already in flight"
                );
                return Ok(DispatchOutcome::Duplicate {
                    action: name,
                    existing,
                });
            }
        };

        if let Some(conflict) = detectors.first_blocking(cluster, subject, &action) {
            drop(reservation);
            let reason = conflict.describe();
            warn!(
                cluster_id = %self.cluster_id,
                action = %name,
                conflict = conflict.kind(),
                subject = %conflict.subject(),
                reason = %reason,
                "Dispatch blocked by conflict"
            );
            cluster
                .raise_alert(
                    AlertMessage::new(
                        AlertLevel::High,
                        format!("Action {name} blocked by {}", conflict.kind()),
                        reason.clone(),
                    )
                    .for_cluster(&self.cluster_id)
                    .with_context(conflict.context()),
                )
                .await;
            return Ok(DispatchOutcome::Blocked {
                action: name,
                conflict: conflict.kind().to_string(),
                subject: conflict.subject().to_string(),
                reason,
            });
        }

        let action = Arc::new(action);
        self.track(&action);
        self.announce_dispatch(cluster, &action).await;

        let task_cluster = Arc::clone(cluster);
        let task_action = Arc::clone(&action);
        tokio::spawn(async move {
            task_cluster
                .engine()
                .execute(&task_cluster, task_action, reservation)
                .await;
        });

        Ok(DispatchOutcome::Dispatched(action))
    }

    /// Dispatch and wait for the action to reach a terminal state
    pub async fn dispatch_and_wait(&self, cluster: &Arc<Cluster>, action: Action) -> OrionResult<DispatchOutcome> {
        let outcome = self.dispatch(cluster, action).await?;
        if let Some(action) = outcome.action() {
            action.wait_for_completion().await;
        }
        Ok(outcome)
    }

    pub(crate) async fn run_child(
        &self,
        cluster: &Arc<Cluster>,
        parent: &Arc<Action>,
        mut child: Action,
        policy: ChildPolicy,
    ) -> Result<ActionState, ActionError> {
        child.adopt(parent);
        let name = child.name().to_string();

        if !cluster.is_action_enabled(&name) {
            return settle_child(
                policy,
                &name,
                ActionState::Failed,
                format!("{name} is not enabled for cluster {}", self.cluster_id),
            );
        }

        let reservation = match self.in_flight.try_reserve(child.equivalence_key(), child.id()) {
            Ok(reservation) => reservation,
            Err(existing) => {
                return settle_child(
                    policy,
                    &name,
                    ActionState::Failed,
                    format!("equivalent action {existing} is already in flight"),
                )
            }
        };

        let child = Arc::new(child);
        self.track(&child);
        parent.add_child(ChildHandle {
            id: child.id(),
            policy,
        });
        self.announce_dispatch(cluster, &child).await;

        let task_cluster = Arc::clone(cluster);
        let task_child = Arc::clone(&child);
        tokio::spawn(async move {
            task_cluster
                .engine()
                .execute(&task_cluster, task_child, reservation)
                .await;
        });

        let wait = self.config.child_wait_timeout();
        match tokio::time::timeout(wait, child.wait_for_completion()).await {
            Ok(state) => settle_child(policy, &name, state, child.error().unwrap_or_default()),
            Err(_) => match policy {
                ChildPolicy::FailParent => Err(ActionError::timeout(
                    format!("child action {name}"),
                    wait.as_millis() as u64,
                )),
                ChildPolicy::Ignore => Ok(child.state()),
            },
        }
    }

    async fn execute(&self, cluster: &Arc<Cluster>, action: Arc<Action>, reservation: Reservation) {
        if let Err(e) = self.transition(&action, ActionEvent::Start, None).await {
            error!(action_id = %action.id(), error = %e, "Action could not be started");
            return;
        }

        let policy = action
            .retry_policy()
            .copied()
            .unwrap_or(self.config.default_retry);

        let attempts = self.run_attempts(cluster, &action, &policy);
        let mut outcome = match action.deadline() {
            Some(deadline) => tokio::time::timeout(deadline, attempts)
                .await
                .unwrap_or_else(|_| {
                    Err(ActionError::timeout(
                        format!("action {}", action.name()),
                        deadline.as_millis() as u64,
                    ))
                }),
            None => attempts.await,
        };

        if outcome.is_ok() {
            outcome = self.run_success_hook(cluster, &action).await;
        }

        match outcome {
            Ok(()) => {
                self.rerun_post_run_sensors(cluster, &action).await;
                if let Err(e) = self.transition(&action, ActionEvent::Succeed, Some(reservation)).await {
                    error!(action_id = %action.id(), error = %e, "Failed to record success");
                }
            }
            Err(cause) => {
                let reason = cause.to_string();
                let event = ActionEvent::Fail(reason.clone());
                if let Err(e) = self.transition(&action, event, Some(reservation)).await {
                    error!(action_id = %action.id(), error = %e, "Failed to record failure");
                }
                cluster
                    .raise_alert(
                        AlertMessage::new(
                            AlertLevel::Medium,
                            format!("Action {} failed", action.name()),
                            reason,
                        )
                        .for_cluster(&self.cluster_id)
                        .with_owner(action.owner().unwrap_or_default())
                        .with_context(json!({
                            "action_id": action.id().to_string(),
                            "attempts": action.attempts(),
                        })),
                    )
                    .await;
            }
        }
    }

    async fn run_attempts(
        &self,
        cluster: &Arc<Cluster>,
        action: &Arc<Action>,
        policy: &RetryPolicy,
    ) -> Result<(), ActionError> {
        let mut attempt = 1;
        loop {
            let ctx = ActionContext::new(Arc::clone(action), Arc::clone(cluster), attempt);
            let result = AssertUnwindSafe(action.handler().run(&ctx))
                .catch_unwind()
                .await
                .unwrap_or(Err(ActionError::Panicked));

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && policy.allows_retry_after(attempt) => {
                    let backoff = policy.backoff_for(attempt);
                    warn!(
                        action_id = %action.id(),
                        action = %action.name(),
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    let event = ActionEvent::AttemptFailed {
                        attempt,
                        error: e.to_string(),
                    };
                    if let Err(transition_error) = self.transition(action, event, None).await {
                        error!(action_id = %action.id(), error = %transition_error, "Failed to record retry");
                        return Err(e);
                    }
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_success_hook(&self, cluster: &Arc<Cluster>, action: &Arc<Action>) -> Result<(), ActionError> {
        let ctx = ActionContext::new(Arc::clone(action), Arc::clone(cluster), action.attempts());
        let result = AssertUnwindSafe(action.handler().on_succeeded(&ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ActionError::hook_failed("success hook panicked")));

        result.map_err(|e| match e {
            ActionError::HookFailed { .. } => e,
            other => ActionError::hook_failed(other.to_string()),
        })
    }

    async fn rerun_post_run_sensors(&self, cluster: &Arc<Cluster>, action: &Arc<Action>) {
        if action.post_run_sensors().is_empty() {
            return;
        }

        let incomplete = cluster
            .rerun_sensors(action.post_run_sensors(), self.post_run_sensor_timeout)
            .await;
        if incomplete.is_empty() {
            return;
        }

        let warning = format!("post-run sensors did not complete: {}", incomplete.join(", "));
        warn!(action_id = %action.id(), warning = %warning, "Post-run sensor refresh incomplete");
        if let Err(e) = action.set_result(POST_RUN_WARNING, json!(warning)) {
            warn!(action_id = %action.id(), error = %e, "Could not record post-run warning");
        }
    }

    /// Apply `event` and audit the resulting transition
    ///
    /// A terminal event hands over the action's reservation, which is freed
    /// with the state change.
    async fn transition(
        &self,
        action: &Arc<Action>,
        event: ActionEvent,
        reservation: Option<Reservation>,
    ) -> OrionResult<Transition> {
        let transition = match reservation {
            Some(reservation) => action.settle(&event, reservation)?,
            None => action.apply(&event)?,
        };

        log_action_operation(
            event.event_type(),
            &self.cluster_id,
            Some(&action.id().to_string()),
            Some(action.name()),
            &transition.to.to_string(),
            event.error_message(),
        );

        let audit = AuditEvent {
            action_id: action.id(),
            action_name: action.name().to_string(),
            cluster_id: self.cluster_id.clone(),
            parent_id: action.parent(),
            event_type: event.event_type().to_string(),
            from_state: transition.from,
            to_state: transition.to,
            attempt: transition.attempt,
            error: event.error_message().map(str::to_string),
            recorded_at: transition.at,
        };
        match tokio::time::timeout(self.config.audit_timeout(), self.auditor.record(audit)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(action_id = %action.id(), error = %e, "Audit record failed"),
            Err(_) => warn!(
                action_id = %action.id(),
                timeout_ms = self.config.audit_timeout_ms,
                "Audit record timed out"
            ),
        }

        Ok(transition)
    }

    async fn announce_dispatch(&self, cluster: &Arc<Cluster>, action: &Arc<Action>) {
        info!(
            cluster_id = %self.cluster_id,
            action_id = %action.id(),
            action = %action.name(),
            parent = ?action.parent(),
            "Action dispatched"
        );
        if self.config.dispatch_alerts {
            cluster
                .raise_alert(
                    AlertMessage::new(
                        AlertLevel::Low,
                        format!("Action {} dispatched", action.name()),
                        format!("{} dispatched on cluster {}", action.name(), self.cluster_id),
                    )
                    .for_cluster(&self.cluster_id)
                    .with_owner(action.owner().unwrap_or_default())
                    .with_context(json!({ "action_id": action.id().to_string() })),
                )
                .await;
        }
    }

    fn track(&self, action: &Arc<Action>) {
        self.tracked.insert(action.id(), Arc::clone(action));
    }

    pub fn action(&self, id: ActionId) -> Option<Arc<Action>> {
        self.tracked.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Tracked actions, newest first
    pub fn actions(&self) -> Vec<Arc<Action>> {
        let mut actions: Vec<_> = self
            .tracked
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        actions.sort_by(|a, b| b.id().cmp(&a.id()));
        actions
    }

    /// Tracked actions that have not reached a terminal state, newest first
    pub fn active_actions(&self) -> Vec<Arc<Action>> {
        self.actions()
            .into_iter()
            .filter(|action| !action.is_terminal())
            .collect()
    }

    pub fn children_of(&self, id: ActionId) -> Vec<Arc<Action>> {
        self.action(id)
            .map(|parent| {
                parent
                    .children()
                    .iter()
                    .filter_map(|child| self.action(child.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every tracked action below `id`
    pub fn descendants(&self, id: ActionId) -> Vec<Arc<Action>> {
        let mut found = Vec::new();
        let mut frontier = vec![id];
        while let Some(next) = frontier.pop() {
            for child in self.children_of(next) {
                frontier.push(child.id());
                found.push(child);
            }
        }
        found
    }

    /// Drop terminal actions that completed longer ago than the expiry
    pub fn cleanup_expired(&self) -> usize {
        let expiry = chrono::Duration::from_std(self.config.tracked_action_expiry())
            .unwrap_or_else(|_| chrono::Duration::days(1));
        self.cleanup_completed_before(Utc::now() - expiry)
    }

    pub fn cleanup_completed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.tracked.len();
        self.tracked.retain(|_, action| {
            let snapshot = action.snapshot();
            !(snapshot.state.is_terminal() && snapshot.completed_at.is_some_and(|done| done < cutoff))
        });
        let removed = before.saturating_sub(self.tracked.len());
        if removed > 0 {
            debug!(cluster_id = %self.cluster_id, removed = removed, "Expired tracked actions");
        }
        removed
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }
}

fn settle_child(
    policy: ChildPolicy,
    name: &str,
    state: ActionState,
    reason: String,
) -> Result<ActionState, ActionError> {
    match (state, policy) {
        (ActionState::Failed, ChildPolicy::FailParent) => Err(ActionError::child_failed(name, reason)),
        _ => Ok(state),
    }
}

impl std::fmt::Debug for ActionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEngine")
            .field("cluster_id", &self.cluster_id)
            .field("tracked", &self.tracked.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
