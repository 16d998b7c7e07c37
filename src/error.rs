//! # Error Taxonomy
//!
//! Structured error handling for the automation control plane.
//!
//! Each concern owns a focused `thiserror` enum; [`OrionError`] is the
//! top-level type that every fallible public API can convert into.
//!
//! - [`ConnectionError`] - coordination store unreachable or session lost
//! - [`ObservationError`] - a sensor pass failed (logged, never propagated)
//! - [`ActionError`] - an action's work function failed
//! - [`ConfigurationError`] - plugin or configuration problems at bootstrap
//!
//! Guard decisions that prevent a dispatch are not errors at all; they are
//! reported through [`crate::action::DispatchOutcome`].

use crate::config::ConfigurationError;
use thiserror::Error;

/// Top-level error for the control plane
#[derive(Error, Debug)]
pub enum OrionError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Observation error: {0}")]
    Observation(#[from] ObservationError),

    #[error("Action execution error: {0}")]
    ActionExecution(#[from] ActionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Invalid action '{action}': {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("State persistence failed for cluster {cluster_id}: {reason}")]
    StatePersistence { cluster_id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrionError {
    pub fn invalid_transition(from: impl Into<String>, event: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            event: event.into(),
        }
    }

    pub fn invalid_action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn state_persistence(cluster_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StatePersistence {
            cluster_id: cluster_id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for control plane operations
pub type OrionResult<T> = Result<T, OrionError>;

/// Coordination store connectivity failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Coordination store '{target}' unreachable after {attempts} attempts: {reason}")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        reason: String,
    },

    #[error("Coordination store refused connection to '{target}': {reason}")]
    Refused { target: String, reason: String },

    #[error("Coordination session lost: {reason}")]
    SessionLost { reason: String },

    #[error("Coordination operation on '{path}' failed: {reason}")]
    OperationFailed { path: String, reason: String },
}

impl ConnectionError {
    pub fn refused(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Refused {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn session_lost(reason: impl Into<String>) -> Self {
        Self::SessionLost {
            reason: reason.into(),
        }
    }

    pub fn operation_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OperationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the handle that produced this error should be discarded
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::SessionLost { .. })
    }
}

/// Failure while waiting on a coordination path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("Path '{path}' still present after {waited_ms}ms")]
    Timeout { path: String, waited_ms: u64 },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// A sensor pass failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObservationError {
    #[error("Sensor '{sensor}' timed out after {timeout_ms}ms")]
    Timeout { sensor: String, timeout_ms: u64 },

    #[error("Sensor '{sensor}' call to {service} failed: {reason}")]
    Rpc {
        sensor: String,
        service: String,
        reason: String,
    },

    #[error("Sensor '{sensor}' requires capability '{capability}' which the cluster type does not provide")]
    MissingCapability { sensor: String, capability: String },

    #[error("Sensor '{sensor}' produced invalid data: {reason}")]
    InvalidData { sensor: String, reason: String },

    #[error("Sensor '{sensor}' panicked")]
    Panicked { sensor: String },
}

impl ObservationError {
    pub fn rpc(
        sensor: impl Into<String>,
        service: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Rpc {
            sensor: sensor.into(),
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_capability(sensor: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::MissingCapability {
            sensor: sensor.into(),
            capability: capability.into(),
        }
    }

    pub fn invalid_data(sensor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            sensor: sensor.into(),
            reason: reason.into(),
        }
    }
}

/// An action's work function failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Missing required attribute '{key}'")]
    MissingAttribute { key: String },

    #[error("Attribute '{key}' has an unexpected shape: {reason}")]
    InvalidAttribute { key: String, reason: String },

    #[error("Transient failure in {service}: {reason}")]
    Transient { service: String, reason: String },

    #[error("External service error: {service} - {reason}")]
    ExternalService { service: String, reason: String },

    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Child action '{child}' failed: {reason}")]
    ChildFailed { child: String, reason: String },

    #[error("Success hook failed: {reason}")]
    HookFailed { reason: String },

    #[error("Precondition failed: {reason}")]
    Precondition { reason: String },

    #[error("Capability '{capability}' not available on cluster '{cluster_id}'")]
    MissingCapability {
        capability: String,
        cluster_id: String,
    },

    #[error("Action {action_id} is terminal; results are frozen")]
    Frozen { action_id: String },

    #[error("Work function panicked")]
    Panicked,

    #[error("Coordination failure: {0}")]
    Connection(#[from] ConnectionError),
}

impl ActionError {
    pub fn missing_attribute(key: impl Into<String>) -> Self {
        Self::MissingAttribute { key: key.into() }
    }

    pub fn invalid_attribute(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn external(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn child_failed(child: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChildFailed {
            child: child.into(),
            reason: reason.into(),
        }
    }

    pub fn hook_failed(reason: impl Into<String>) -> Self {
        Self::HookFailed {
            reason: reason.into(),
        }
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    pub fn missing_capability(capability: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self::MissingCapability {
            capability: capability.into(),
            cluster_id: cluster_id.into(),
        }
    }

    /// Only transient external failures are worth another attempt.
    /// An exhausted reconnect budget is final for the enclosing action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<WaitError> for ActionError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout { path, waited_ms } => {
                Self::timeout(format!("waiting for deletion of {path}"), waited_ms)
            }
            WaitError::Connection(conn) => Self::Connection(conn),
        }
    }
}
