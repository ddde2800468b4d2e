use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ShopifyApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Rate limited by the platform")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Platform throttled the request: {0}")]
    Throttled(String),
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("The response did not contain any data")]
    EmptyResponse,
}

impl ShopifyApiError {
    /// Structured retry classification. Network hiccups, timeouts, throttling and server-side failures are worth
    /// retrying; client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RestResponseError(_) | Self::Timeout(_) | Self::RateLimited { .. } | Self::Throttled(_) => true,
            Self::QueryError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// True for errors that indicate the integration itself is broken (revoked credential, deleted resource).
    /// Callers should fail fast and flag the integration for reconnection.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::QueryError { status, .. } if matches!(status, 400 | 401 | 403 | 404))
    }

    /// The explicit wait the platform asked for, if it supplied one.
    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classification() {
        assert!(ShopifyApiError::Timeout("read".into()).is_retryable());
        assert!(ShopifyApiError::QueryError { status: 503, message: String::new() }.is_retryable());
        assert!(ShopifyApiError::QueryError { status: 429, message: String::new() }.is_retryable());
        assert!(ShopifyApiError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ShopifyApiError::QueryError { status: 404, message: String::new() }.is_retryable());
        assert!(ShopifyApiError::QueryError { status: 401, message: String::new() }.is_permanent());
        assert!(!ShopifyApiError::Timeout("read".into()).is_permanent());
    }

    #[test]
    fn retry_after_hint_only_for_rate_limits() {
        let e = ShopifyApiError::RateLimited { retry_after: Some(Duration::from_secs(2)) };
        assert_eq!(e.retry_after_hint(), Some(Duration::from_secs(2)));
        assert_eq!(ShopifyApiError::EmptyResponse.retry_after_hint(), None);
    }
}
