//! # Action Audit Trail
//!
//! Every lifecycle transition of every action is handed to an
//! [`ActionAuditor`]. Auditing is best effort: the engine logs a failed or
//! slow auditor and carries on, so an unavailable audit backend can never
//! fail an action.

use crate::action::ActionState;
use crate::identity::ActionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// One recorded lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action_id: ActionId,
    pub action_name: String,
    pub cluster_id: String,
    pub parent_id: Option<ActionId>,
    /// From [`crate::action::ActionEvent::event_type`]
    pub event_type: String,
    pub from_state: ActionState,
    pub to_state: ActionState,
    pub attempt: u32,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn is_failed_attempt(&self) -> bool {
        self.event_type == "attempt_failed"
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Audit record rejected: {reason}")]
    Rejected { reason: String },
}

/// Receives lifecycle transitions
#[async_trait]
pub trait ActionAuditor: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Writes transitions to the structured log
#[derive(Debug, Default)]
pub struct LoggingAuditor;

#[async_trait]
impl ActionAuditor for LoggingAuditor {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::debug!(
            action_id = %event.action_id,
            action_name = %event.action_name,
            cluster_id = %event.cluster_id,
            event_type = %event.event_type,
            from = %event.from_state,
            to = %event.to_state,
            attempt = event.attempt,
            error = event.error.as_deref(),
            "📝 AUDIT"
        );
        Ok(())
    }
}

/// Fans audit events out to any number of subscribers
#[derive(Debug, Clone)]
pub struct AuditPublisher {
    sender: broadcast::Sender<AuditEvent>,
}

impl AuditPublisher {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuditPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl ActionAuditor for AuditPublisher {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        // No subscribers is fine: the transition still happened.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Keeps the full trail in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditor {
    events: Mutex<Vec<AuditEvent>>,
    failing: std::sync::atomic::AtomicBool,
}

impl InMemoryAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, action_id: ActionId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.action_id == action_id)
            .cloned()
            .collect()
    }

    /// Reject every record from now on
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl ActionAuditor for InMemoryAuditor {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AuditError::Unavailable {
                reason: "in-memory auditor set to fail".to_string(),
            });
        }
        self.events.lock().push(event);
        Ok(())
    }
}
