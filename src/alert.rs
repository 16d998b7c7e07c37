//! # Alerts
//!
//! Alert messages raised when a conflict blocks a dispatch, when an action
//! fails, or when an action wants to notify humans. Delivery is the job of an
//! external [`AlertSink`]; the control loop only routes messages through an
//! [`AlertFactory`] and never waits on delivery beyond the send call.

use crate::constants::{ALERT_ENTITY, AUTOMATION_OWNER};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub id: Uuid,
    pub level: AlertLevel,
    pub title: String,
    pub body: String,
    pub owner: String,
    pub entity: String,
    pub cluster_id: Option<String>,
    /// Structured context for the receiving system
    pub context: Value,
    pub created_at: DateTime<Utc>,
}

impl AlertMessage {
    pub fn new(level: AlertLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            title: title.into(),
            body: body.into(),
            owner: AUTOMATION_OWNER.to_string(),
            entity: ALERT_ENTITY.to_string(),
            cluster_id: None,
            context: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn for_cluster(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("Alert sink '{sink}' rejected message: {reason}")]
    Rejected { sink: String, reason: String },

    #[error("Alert sink '{sink}' unavailable: {reason}")]
    Unavailable { sink: String, reason: String },
}

/// Delivery backend for alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &AlertMessage) -> Result<(), AlertError>;
}

/// Chooses the sinks that receive an alert
pub trait AlertFactory: Send + Sync {
    fn sinks_for(&self, cluster_id: &str, level: AlertLevel) -> Vec<Arc<dyn AlertSink>>;
}

/// Sends every alert to the same sinks, optionally above a minimum level
pub struct StaticAlertFactory {
    sinks: Vec<Arc<dyn AlertSink>>,
    minimum_level: AlertLevel,
}

impl StaticAlertFactory {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self {
            sinks,
            minimum_level: AlertLevel::Low,
        }
    }

    pub fn with_minimum_level(mut self, level: AlertLevel) -> Self {
        self.minimum_level = level;
        self
    }
}

impl AlertFactory for StaticAlertFactory {
    fn sinks_for(&self, _cluster_id: &str, level: AlertLevel) -> Vec<Arc<dyn AlertSink>> {
        if level < self.minimum_level {
            return Vec::new();
        }
        self.sinks.clone()
    }
}

/// Writes alerts to the structured log
#[derive(Debug, Default)]
pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), AlertError> {
        crate::logging::log_alert(
            alert.cluster_id.as_deref().unwrap_or("-"),
            &alert.level.to_string(),
            &alert.title,
            &alert.body,
        );
        Ok(())
    }
}

/// Keeps alerts in memory; backs the queryable alert view and tests
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    alerts: Mutex<Vec<AlertMessage>>,
    failing: std::sync::atomic::AtomicBool,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertMessage> {
        self.alerts.lock().clone()
    }

    pub fn alerts_at(&self, level: AlertLevel) -> Vec<AlertMessage> {
        self.alerts
            .lock()
            .iter()
            .filter(|alert| alert.level == level)
            .cloned()
            .collect()
    }

    /// Make subsequent sends fail, to exercise delivery failure handling
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.alerts.lock().clear();
    }
}

#[async_trait]
impl AlertSink for InMemoryAlertSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), AlertError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AlertError::Unavailable {
                sink: self.name().to_string(),
                reason: "sink disabled".to_string(),
            });
        }
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}
