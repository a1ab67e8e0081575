//! BMM client errors

use thiserror::Error;

/// Errors that can occur when interacting with the BMM API
#[derive(Debug, Error)]
pub enum BmmError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// BMM API returned a non-success status
    #[error("BMM API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or description
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., bad endpoint URL)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request did not complete before its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl BmmError {
    /// True when the remote side reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
