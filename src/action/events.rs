use serde::{Deserialize, Serialize};

/// Events that drive action state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ActionEvent {
    /// Invoke the work function
    Start,
    /// An attempt failed with a retryable error; another attempt follows
    AttemptFailed { attempt: u32, error: String },
    /// Work function and success hook completed
    Succeed,
    /// Terminal failure with its cause
    Fail(String),
}

impl ActionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::AttemptFailed { .. } => "attempt_failed",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
        }
    }

    /// Extract error message if this event carries one
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::AttemptFailed { error, .. } => Some(error),
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeed | Self::Fail(_))
    }
}
