//! Retry policy for calls to remote collaborators.

use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use http::StatusCode;

/// Response statuses worth retrying: timeouts, rate limiting and transient server errors.
pub const RETRYABLE_STATUSES: [StatusCode; 6] = [
    StatusCode::REQUEST_TIMEOUT,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Returns `true` if a request answered with `status` may succeed when retried.
pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Constant-delay retry policy.
///
/// Only applied at the transport boundary: resolution and diffing are pure and never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy retrying up to `attempts` times, waiting `delay` in between.
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl BackoffBuilder for &RetryPolicy {
    type Backoff = <ConstantBuilder as BackoffBuilder>::Backoff;

    fn build(self) -> Self::Backoff {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.attempts)
            .build()
    }
}
