//! Retry and fault-isolation primitives for calls against the platform API.
//!
//! All outbound calls share the same failure model: transient network trouble and throttling are retried with
//! exponential backoff, client errors fail fast, and a tripped [`CircuitBreaker`] stops a misbehaving integration
//! from hammering the remote endpoint at all.

use std::{
    future::Future,
    sync::Mutex,
    time::Duration,
};

use log::{debug, warn};
use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::{api::ApiResponse, ShopifyApiError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Adds up to 25% uniform jitter to each delay so concurrent callers hitting the same rate-limited endpoint do
    /// not retry in lock-step.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// `min(initial_delay * multiplier^attempt, max_delay)`, plus jitter when the policy asks for it.
pub fn calculate_backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.initial_delay.as_millis() as f64 * policy.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(policy.max_delay.as_millis() as f64);
    let millis = if policy.jitter { capped * (1.0 + rand::thread_rng().gen_range(0.0..0.25)) } else { capped };
    Duration::from_millis(millis as u64)
}

/// Retry `op` with exponential backoff, using the default retryable classification
/// ([`ShopifyApiError::is_retryable`]).
pub async fn retry_with_backoff<T, F, Fut>(op: F, policy: RetryPolicy) -> Result<T, ShopifyApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ShopifyApiError>>,
{
    retry_with_policy(op, policy, ShopifyApiError::is_retryable).await
}

/// Retry `op` with exponential backoff. Errors for which `should_retry` returns false are returned immediately.
pub async fn retry_with_policy<T, F, Fut, R>(
    op: F,
    policy: RetryPolicy,
    should_retry: R,
) -> Result<T, ShopifyApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ShopifyApiError>>,
    R: Fn(&ShopifyApiError) -> bool,
{
    let mut last_error = None;
    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                if attempt < policy.max_retries {
                    let delay = calculate_backoff_delay(&policy, attempt);
                    warn!(
                        "Attempt {}/{} failed: {e}. Retrying in {delay:?}",
                        attempt + 1,
                        policy.max_retries + 1
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            },
        }
    }
    Err(last_error.unwrap_or(ShopifyApiError::EmptyResponse))
}

/// Rate-limit-aware retry for calls that surface the decoded [`crate::rate_limit::CallBudget`].
///
/// On top of the standard backoff behaviour this honours the platform's explicit retry-after hint, and treats a
/// successful response that drained the call budget as a reason to pause before handing control back, so a paging
/// loop does not immediately run into a 429.
pub async fn retry_with_rate_limit<T, F, Fut>(op: F, policy: RetryPolicy) -> Result<T, ShopifyApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<ApiResponse<T>, ShopifyApiError>>,
{
    let mut last_error = None;
    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(response) => {
                if response.budget.is_exhausted() {
                    let pause = response.budget.retry_after.unwrap_or(policy.initial_delay);
                    debug!("Call budget exhausted ({}/{}). Pausing {pause:?}", response.budget.used, response.budget.limit);
                    sleep(pause).await;
                }
                return Ok(response.value);
            },
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                if attempt < policy.max_retries {
                    let delay = e.retry_after_hint().unwrap_or_else(|| calculate_backoff_delay(&policy, attempt));
                    warn!(
                        "Attempt {}/{} failed: {e}. Retrying in {delay:?}",
                        attempt + 1,
                        policy.max_retries + 1
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            },
        }
    }
    Err(last_error.unwrap_or(ShopifyApiError::EmptyResponse))
}

//--------------------------------------   CircuitBreaker   ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Opens after `threshold` consecutive failures. While open, calls fail immediately with
/// [`ShopifyApiError::CircuitOpen`] without touching the network. Once `timeout` has elapsed, exactly one half-open
/// trial call is admitted; its success closes the breaker, its failure re-opens it.
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ShopifyApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ShopifyApiError>>,
    {
        self.admit()?;
        match op().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            },
            Err(e) => {
                self.record_failure();
                Err(e)
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn admit(&self) -> Result<(), ShopifyApiError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = inner.opened_at.map(|t| t.elapsed() >= self.timeout).unwrap_or(true);
                if cooled_down {
                    debug!("Circuit breaker cool-down elapsed. Admitting a single trial call");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(())
                } else {
                    Err(ShopifyApiError::CircuitOpen)
                }
            },
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(ShopifyApiError::CircuitOpen)
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            },
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.trial_in_flight = false;
        match inner.state {
            CircuitState::HalfOpen => {
                warn!("Circuit breaker trial call failed. Re-opening");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            },
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    warn!("Circuit breaker tripped after {} consecutive failures", inner.consecutive_failures);
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            },
            CircuitState::Open => {},
        }
    }
}
