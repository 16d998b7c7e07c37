//! Lifecycle bookkeeping for one action.
//!
//! All mutable action state lives in a single [`LifecycleSnapshot`] behind one
//! lock, so a reader always sees a consistent combination of state,
//! timestamps and results. It can never observe `running` with a completion
//! timestamp.

use super::events::ActionEvent;
use super::states::{ActionState, ChildPolicy};
use crate::error::{OrionError, OrionResult};
use crate::identity::ActionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Handle from a parent to one of its children in the engine's action arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildHandle {
    pub id: ActionId,
    pub policy: ChildPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub state: ActionState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Attempts begun so far
    pub attempts: u32,
    pub results: BTreeMap<String, Value>,
    pub children: Vec<ChildHandle>,
}

/// A transition that was applied
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ActionState,
    pub to: ActionState,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

impl LifecycleSnapshot {
    pub(crate) fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            state: ActionState::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            error: None,
            attempts: 0,
            results: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Apply `event`, recording timestamps together with the state change
    pub(crate) fn apply(&mut self, event: &ActionEvent, now: DateTime<Utc>) -> OrionResult<Transition> {
        let from = self.state;
        let to = determine_target_state(from, event)?;

        match event {
            ActionEvent::Start => {
                self.started_at = Some(now);
                self.attempts = 1;
            }
            ActionEvent::AttemptFailed { attempt, .. } => {
                self.attempts = attempt + 1;
            }
            ActionEvent::Succeed => {
                self.completed_at = Some(now);
            }
            ActionEvent::Fail(cause) => {
                self.completed_at = Some(now);
                self.error = Some(cause.clone());
            }
        }
        self.state = to;

        Ok(Transition {
            from,
            to,
            attempt: self.attempts,
            at: now,
        })
    }
}

/// Determine the target state based on current state and event
pub(crate) fn determine_target_state(
    current_state: ActionState,
    event: &ActionEvent,
) -> OrionResult<ActionState> {
    let target = match (current_state, event) {
        (ActionState::Pending, ActionEvent::Start) => ActionState::Running,

        // Retries stay in running
        (ActionState::Running, ActionEvent::AttemptFailed { .. }) => ActionState::Running,

        (ActionState::Running, ActionEvent::Succeed) => ActionState::Succeeded,
        (ActionState::Running, ActionEvent::Fail(_)) => ActionState::Failed,

        // An action that cannot start (e.g. its cluster went away) fails directly
        (ActionState::Pending, ActionEvent::Fail(_)) => ActionState::Failed,

        (from_state, _) => {
            return Err(OrionError::invalid_transition(
                from_state.to_string(),
                event.event_type(),
            ))
        }
    };

    Ok(target)
}
