use std::time::Duration;

use thiserror::Error;

/// Centralized error type for lyra-net.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Timeout")]
    Timeout,
    #[error("Request failed after {max_retries} retries: {source}")]
    RetryExhausted {
        max_retries: u32,
        source: Box<NetError>,
    },
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Server-provided `Retry-After` hint, when present.
        retry_after: Option<Duration>,
    },
    #[error("short body: expected {expected} bytes, got {got}")]
    ShortBody { expected: u64, got: u64 },
    #[error("cancelled")]
    Cancelled,
}

impl NetError {
    /// Creates an HTTP status error without a retry hint.
    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            retry_after: None,
        }
    }

    /// Creates an HTTP error from a generic string.
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    /// Creates an error from a reqwest failure, keeping timeouts distinguishable.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = error.status() {
            let url = error.url().map(ToString::to_string).unwrap_or_default();
            return Self::http_status(status.as_u16(), url);
        }
        Self::Http(error.to_string())
    }

    /// Checks if this error is considered retryable.
    ///
    /// Connection-level failures, timeouts, short bodies, 5xx, 408 and 429
    /// are transient. Other statuses and local validation errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetError::Http(_) | NetError::Timeout | NetError::ShortBody { .. } => true,
            NetError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            NetError::RetryExhausted { .. }
            | NetError::InvalidRange(_)
            | NetError::Cancelled => false,
        }
    }

    /// Checks if this error indicates a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout)
    }

    /// Gets the HTTP status code if this is an HTTP status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::HttpStatus { status, .. } => Some(*status),
            NetError::RetryExhausted { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// Server-requested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            NetError::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        Self::from_reqwest(&error)
    }
}

pub type NetResult<T> = Result<T, NetError>;
