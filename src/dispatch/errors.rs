//! Dispatch Error Types
//!
//! Every adapter failure is one of these; each maps to exactly one
//! HTTP-style status carried in the response envelope.

use std::time::Duration;

use thiserror::Error;

/// Result of one adapter operation
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Request-level error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Malformed request body or missing required field
    #[error("{0}")]
    InvalidRequest(String),

    /// No route matched and there was no body to fall back on
    #[error("unknown path: {0}")]
    UnknownPath(String),

    /// Backend driver failure (relational, key-value, document)
    #[error("{0}")]
    Backend(String),

    /// Backend failure reported as a gateway error (columnar)
    #[error("{0}")]
    Gateway(String),

    /// Health probe failed
    #[error("{0}")]
    Unavailable(String),

    /// Operation exceeded its deadline
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl BridgeError {
    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a backend error
    pub fn backend(err: impl ToString) -> Self {
        Self::Backend(err.to_string())
    }

    /// Create a gateway error
    pub fn gateway(err: impl ToString) -> Self {
        Self::Gateway(err.to_string())
    }

    /// Create an unavailable error
    pub fn unavailable(err: impl ToString) -> Self {
        Self::Unavailable(err.to_string())
    }

    /// Get error code for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UnknownPath(_) => "UNKNOWN_PATH",
            Self::Backend(_) => "BACKEND_ERROR",
            Self::Gateway(_) => "BAD_GATEWAY",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::UnknownPath(_) => 404,
            Self::Backend(_) => 500,
            Self::Gateway(_) => 502,
            Self::Unavailable(_) => 503,
            Self::Timeout(_) => 504,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BridgeError::invalid_request("x").status_code(), 400);
        assert_eq!(BridgeError::UnknownPath("/x".into()).status_code(), 404);
        assert_eq!(BridgeError::backend("x").status_code(), 500);
        assert_eq!(BridgeError::gateway("x").status_code(), 502);
        assert_eq!(BridgeError::unavailable("x").status_code(), 503);
        assert_eq!(
            BridgeError::Timeout(Duration::from_secs(1)).status_code(),
            504
        );
    }

    #[test]
    fn test_unknown_path_message() {
        let err = BridgeError::UnknownPath("/nope".into());
        assert_eq!(err.to_string(), "unknown path: /nope");
    }
}
