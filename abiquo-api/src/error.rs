//! Error types for the Abiquo API layer.

use thiserror::Error;

/// Errors that can occur while talking to the Abiquo API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport level failure (connection refused, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    /// The requested resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A resource lacks a link the operation needs.
    #[error("Resource {resource} has no '{rel}' link")]
    MissingLink { resource: String, rel: String },

    /// The service is temporarily unable to answer.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Whether retrying the same read later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(_) | ApiError::Unavailable(_) => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
