//! Bounded retry policy for venue and market-data calls.
//!
//! Every network call goes through [`RetryPolicy::run`]: a fixed number of
//! attempts with a fixed delay, and a longer backoff when the error signals a
//! rate limit. Errors that represent a venue decision (a rejected order) are
//! never retried.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{MarketError, TradingError};

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient failure; retry after the ordinary delay.
    Transient,
    /// Rate limited; retry after the given backoff, or the policy default.
    RateLimited(Option<Duration>),
    /// Final answer; do not retry.
    Fatal,
}

/// Errors that can classify themselves for retry.
pub trait Retryable {
    /// Classify this error.
    fn retry_class(&self) -> RetryClass;
}

impl Retryable for TradingError {
    fn retry_class(&self) -> RetryClass {
        match self {
            TradingError::RateLimited {
                retry_after_seconds,
            } => RetryClass::RateLimited(Some(Duration::from_secs(*retry_after_seconds))),
            TradingError::OrderRejected { .. }
            | TradingError::InvalidParams(_)
            | TradingError::SigningError(_) => RetryClass::Fatal,
            TradingError::SubmissionFailed(_)
            | TradingError::CancelFailed { .. }
            | TradingError::StatusFailed { .. } => RetryClass::Transient,
        }
    }
}

impl Retryable for MarketError {
    fn retry_class(&self) -> RetryClass {
        match self {
            MarketError::RateLimited => RetryClass::RateLimited(None),
            MarketError::ParseError(_) => RetryClass::Fatal,
            MarketError::FetchFailed { .. } | MarketError::HttpError(_) => RetryClass::Transient,
        }
    }
}

/// Fixed-attempt retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after a transient failure.
    pub delay: Duration,
    /// Delay after a rate-limit signal with no explicit retry-after.
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
            rate_limit_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, delay: Duration, rate_limit_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            rate_limit_backoff,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait before the next attempt, or `None` to give up.
    pub fn next_delay(&self, attempt: u32, class: RetryClass) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        match class {
            RetryClass::Fatal => None,
            RetryClass::Transient => Some(self.delay),
            RetryClass::RateLimited(after) => Some(after.unwrap_or(self.rate_limit_backoff)),
        }
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let class = e.retry_class();
                    let Some(delay) = self.next_delay(attempt, class) else {
                        return Err(e);
                    };
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        rate_limited = matches!(class, RetryClass::RateLimited(_)),
                        error = %e,
                        "Call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
