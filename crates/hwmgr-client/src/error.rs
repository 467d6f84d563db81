//! Hardware manager client errors

use thiserror::Error;

/// Errors that can occur when interacting with the hardware manager API
#[derive(Debug, Error)]
pub enum HwMgrError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Hardware manager API returned an error
    #[error("Hardware manager API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend unreachable or overloaded (502/503/504)
    #[error("Hardware manager unavailable: {0}")]
    Unavailable(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HwMgrError {
    /// Whether the error is expected to clear on its own (network failure,
    /// timeout, gateway errors). Transient errors are retried later rather
    /// than failing the request.
    pub fn is_transient(&self) -> bool {
        match self {
            HwMgrError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            HwMgrError::Unavailable(_) => true,
            _ => false,
        }
    }

    /// Whether the error reports a missing resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, HwMgrError::NotFound(_))
    }
}
