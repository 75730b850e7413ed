//! Retry policy for a single logical invocation.
//!
//! Retries stay internal to one invocation: the breaker and the stats only see
//! the final outcome. The bound is small and the backoff fixed.

use crate::client::ClientError;
use std::time::Duration;

/// Upper bound on retries for one invocation.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Set the retry count, capped at [`MAX_RETRIES`].
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Decide whether to retry after a failed attempt.
    ///
    /// `attempt` is 0-based (first failure => attempt=0).
    pub fn should_retry(&self, attempt: u32, error: &ClientError) -> Option<Duration> {
        if attempt >= self.max_retries || !error.is_retryable() {
            return None;
        }
        Some(self.backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_one_retry_with_short_backoff() {
        let policy = RetryPolicy::default();
        let timeout = ClientError::Timeout {
            after: Duration::from_secs(5),
        };
        assert_eq!(policy.should_retry(0, &timeout), Some(Duration::from_millis(250)));
        assert_eq!(policy.should_retry(1, &timeout), None);
    }

    #[test]
    fn test_backend_errors_are_not_retried() {
        let policy = RetryPolicy::new().with_max_retries(3);
        let err = ClientError::backend(Some(400), "bad category");
        assert_eq!(policy.should_retry(0, &err), None);
    }

    #[test]
    fn test_backoff_is_fixed() {
        let policy = RetryPolicy::new()
            .with_max_retries(3)
            .with_backoff(Duration::from_millis(100));
        let err = ClientError::transport("reset by peer");
        for attempt in 0..3 {
            assert_eq!(
                policy.should_retry(attempt, &err),
                Some(Duration::from_millis(100))
            );
        }
        assert_eq!(policy.should_retry(3, &err), None);
    }

    #[test]
    fn test_none_never_retries() {
        let err = ClientError::transport("refused");
        assert_eq!(RetryPolicy::none().should_retry(0, &err), None);
    }

    #[test]
    fn test_max_retries_is_capped() {
        let policy = RetryPolicy::new().with_max_retries(1000);
        assert_eq!(policy.max_retries, MAX_RETRIES);
    }
}
