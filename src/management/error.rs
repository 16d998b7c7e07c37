use crate::error::ActionError;
use thiserror::Error;

pub const HOST_MANAGEMENT_SERVICE: &str = "host_management";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagementError {
    #[error("Invalid management URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No management token configured")]
    MissingToken,

    #[error("Management request '{operation}' failed: {reason}")]
    Request { operation: String, reason: String },

    #[error("Management request '{operation}' returned HTTP {status}: {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Management response for '{operation}' could not be parsed: {reason}")]
    InvalidResponse { operation: String, reason: String },
}

impl ManagementError {
    pub fn request(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Request {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    pub fn invalid_response(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Transport failures and server-side errors may clear up on their own
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<ManagementError> for ActionError {
    fn from(err: ManagementError) -> Self {
        if err.is_transient() {
            ActionError::transient(HOST_MANAGEMENT_SERVICE, err.to_string())
        } else {
            ActionError::external(HOST_MANAGEMENT_SERVICE, err.to_string())
        }
    }
}
