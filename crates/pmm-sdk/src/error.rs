//! Error types for the PMM client

use thiserror::Error;

/// Errors returned by [`crate::PmmClient`]
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP client error (connection, TLS, timeout, body decoding)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Credentials rejected
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Not found
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Service registration rejected by the server
    #[error("Service registration failed with status {status}: {body}")]
    Registration { status: u16, body: String },

    /// Invalid request built on the client side
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Service unavailable
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    /// Any other non-success response
    #[error("Request failed with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            ApiError::ServiceUnavailable => true,
            ApiError::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Response body attached to the error, if any
    pub fn response_body(&self) -> Option<&str> {
        match self {
            ApiError::Registration { body, .. } | ApiError::UnexpectedStatus { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }
}
