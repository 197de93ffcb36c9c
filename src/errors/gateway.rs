use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type returned by cloud gateway adapters.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Failure classes a gateway adapter maps provider errors onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// Credentials lack permission for the operation.
    AccessDenied,
    /// The resource is in use or a duplicate already exists.
    Conflict,
    /// The provider rejected the call because of request rate.
    Throttling,
    /// The referenced resource does not exist.
    NotFound,
    /// The request payload was rejected as invalid.
    Invalid,
    /// Anything the adapter could not classify.
    Other,
}

impl GatewayErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::Conflict => "conflict",
            Self::Throttling => "throttling",
            Self::NotFound => "not_found",
            Self::Invalid => "invalid",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by a [`CloudGateway`](crate::gateway::CloudGateway) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Conflict, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Invalid, message)
    }

    /// Whether a caller-side retry could succeed. The reconciler itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, GatewayErrorCode::Throttling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = GatewayError::conflict("target group is in use");
        assert_eq!(err.to_string(), "conflict: target group is in use");
    }

    #[test]
    fn test_retryable() {
        assert!(GatewayError::new(GatewayErrorCode::Throttling, "slow down").is_retryable());
        assert!(!GatewayError::not_found("gone").is_retryable());
    }
}
