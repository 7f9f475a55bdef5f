//! Typed errors for workspace and marketplace API calls
//!
//! Lets callers tell an expired session from a missing plugin or a flaky
//! network without string matching.

use thiserror::Error;

/// API operation errors with typed variants
///
/// - `Unauthorized` (401) - session token expired or missing
/// - `Forbidden` (403) - workspace role lacks the permission
/// - `NotFound` (404) - plugin, task or package does not exist
/// - `RateLimited` (429) - console throttled the caller; can retry after delay
/// - `BadRequest` (400) - malformed request; caller error
/// - `Service` (5xx) - server-side issue; can retry
/// - `Network` - connection/timeout; can retry
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Server-side error (HTTP 5xx)
    #[error("Service error: {0}")]
    Service(String),

    /// Any other non-2xx status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection refused, DNS failure, timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Input rejected before any request was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ApiError {
    /// Check if this error is worth retrying after a delay
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited(_) | ApiError::Service(_) | ApiError::Network(_)
        )
    }

    /// Convert HTTP status code and error text into a typed error
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            400 => ApiError::BadRequest(error_text),
            401 => ApiError::Unauthorized(error_text),
            403 => ApiError::Forbidden(error_text),
            404 => ApiError::NotFound(error_text),
            429 => ApiError::RateLimited(error_text),
            500..=599 => ApiError::Service(error_text),
            code => ApiError::Http {
                status: code,
                message: error_text,
            },
        }
    }

    /// Convert transport errors into a typed error
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ApiError::Network(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}
