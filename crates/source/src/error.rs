//! Fetch error taxonomy.

use thiserror::Error;

/// Classified failure from the source-of-record.
///
/// The split drives the orchestrator's policy: transient errors are
/// retried with backoff against the same cursor; permanent errors stop
/// the job with the cursor preserved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeout, connect failure, rate limit, or server-side error.
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Malformed envelope or schema the client cannot interpret.
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// Classify an HTTP status: 408/429/5xx are retryable, other non-2xx
    /// statuses mean the request itself is wrong and retrying won't help.
    pub fn from_status(status: reqwest::StatusCode, body_hint: &str) -> Self {
        if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
            FetchError::Transient(format!("HTTP {status}: {body_hint}"))
        } else {
            FetchError::Permanent(format!("HTTP {status}: {body_hint}"))
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // Network-level failures (timeouts, resets, DNS) are retryable;
        // body decode failures mean the envelope is not what we expect.
        if e.is_timeout() || e.is_connect() || e.is_request() {
            FetchError::Transient(e.to_string())
        } else if e.is_decode() {
            FetchError::Permanent(format!("malformed response envelope: {e}"))
        } else {
            FetchError::Transient(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(FetchError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(FetchError::from_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());
        assert!(FetchError::from_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(FetchError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
        assert!(!FetchError::from_status(StatusCode::BAD_REQUEST, "").is_transient());
        assert!(!FetchError::from_status(StatusCode::NOT_FOUND, "").is_transient());
        assert!(!FetchError::from_status(StatusCode::UNAUTHORIZED, "").is_transient());
    }
}
