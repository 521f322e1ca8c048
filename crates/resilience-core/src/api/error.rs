use std::time::Duration;

use reqwest::{header, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - access token may be invalid")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Service unavailable (status {0})")]
    Unavailable(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    NetworkError(reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// How a failed request should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// 429, optionally with a server-supplied delay.
    RateLimited(Option<Duration>),
    /// Upstream timeout or unavailability.
    Transient,
    /// Anything else that may succeed on a second try.
    Generic,
    /// Retrying cannot help.
    Fatal,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            // URLs may carry an access token in the query string
            ApiError::NetworkError(e.without_url())
        }
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited { retry_after },
            503 | 504 => ApiError::Unavailable(status.as_u16()),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::Rejected(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Turn a non-success response into an error, passing successes through.
    pub async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        Err(Self::from_status(status, &body, retry_after))
    }

    pub fn retry_class(&self) -> RetryClass {
        match self {
            ApiError::RateLimited { retry_after } => RetryClass::RateLimited(*retry_after),
            ApiError::Unavailable(_) | ApiError::Timeout => RetryClass::Transient,
            ApiError::ServerError(_) | ApiError::NetworkError(_) | ApiError::InvalidResponse(_) => {
                RetryClass::Generic
            }
            ApiError::AccessDenied(_)
            | ApiError::Unauthorized
            | ApiError::NotFound(_)
            | ApiError::Rejected(_) => RetryClass::Fatal,
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP dates are ignored and fall
/// back to the caller's own backoff.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
