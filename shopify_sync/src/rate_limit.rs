//! Decoding of the platform's rate-limit signals.
//!
//! Every REST response carries `X-Shopify-Shop-Api-Call-Limit: used/limit`. When the bucket is full the platform
//! responds 429 with a `Retry-After` header, but a well-behaved client should slow down as soon as the remaining
//! budget reaches zero, without waiting for the 429.

use std::time::Duration;

use log::warn;
use reqwest::header::HeaderMap;

pub const CALL_LIMIT_HEADER: &str = "X-Shopify-Shop-Api-Call-Limit";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallBudget {
    pub used: u32,
    pub limit: u32,
    pub retry_after: Option<Duration>,
}

impl CallBudget {
    pub fn new(used: u32, limit: u32) -> Self {
        Self { used, limit, retry_after: None }
    }

    /// Decode the budget from response headers. Absent or malformed headers yield a default (empty) budget rather
    /// than an error, since the limit header is informational.
    pub fn decode(headers: &HeaderMap) -> Self {
        let mut budget = headers
            .get(CALL_LIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_call_limit)
            .unwrap_or_default();
        budget.retry_after = headers
            .get(RETRY_AFTER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map(Duration::from_secs_f64);
        budget
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// A known budget with nothing left. An unknown budget (missing header) never reports exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.limit > 0 && self.remaining() == 0
    }
}

fn parse_call_limit(value: &str) -> Option<CallBudget> {
    let mut parts = value.trim().splitn(2, '/');
    let used = parts.next()?.parse::<u32>().ok();
    let limit = parts.next()?.parse::<u32>().ok();
    match (used, limit) {
        (Some(used), Some(limit)) => Some(CallBudget::new(used, limit)),
        _ => {
            warn!("Unparseable {CALL_LIMIT_HEADER} header: {value}");
            None
        },
    }
}

#[cfg(test)]
mod test {
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::*;

    #[test]
    fn decodes_call_limit() {
        let mut headers = HeaderMap::new();
        headers.insert(CALL_LIMIT_HEADER, HeaderValue::from_static("39/40"));
        let budget = CallBudget::decode(&headers);
        assert_eq!(budget.used, 39);
        assert_eq!(budget.limit, 40);
        assert_eq!(budget.remaining(), 1);
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn exhausted_at_zero_remaining() {
        let mut headers = HeaderMap::new();
        headers.insert(CALL_LIMIT_HEADER, HeaderValue::from_static("40/40"));
        headers.insert(RETRY_AFTER_HEADER, HeaderValue::from_static("2.0"));
        let budget = CallBudget::decode(&headers);
        assert!(budget.is_exhausted());
        assert_eq!(budget.retry_after, Some(Duration::from_secs(2)));
    }

    #[test]
    fn missing_header_is_not_exhausted() {
        let budget = CallBudget::decode(&HeaderMap::new());
        assert_eq!(budget.limit, 0);
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn malformed_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(CALL_LIMIT_HEADER, HeaderValue::from_static("lots"));
        let budget = CallBudget::decode(&headers);
        assert_eq!(budget, CallBudget::default());
    }
}
