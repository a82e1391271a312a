//! Retry limits and backoff schedules for authorized calls.

use std::time::Duration;

use tollgate_store::SessionConfig;

use crate::error::{FailureCategory, TransportError};

/// Retry limits for one authorized call.
///
/// - Authorization rejections: re-acquire up to `auth_retries` times.
/// - 429: exponential backoff `base * 2^attempt`, capped, honoring a larger
///   `Retry-After`.
/// - Network and 5xx: linear backoff `base * attempt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Forced re-acquisitions after a 401/403.
    pub auth_retries: u32,
    /// Retries after a 429.
    pub rate_limit_retries: u32,
    /// Base of the 429 backoff.
    pub rate_limit_base: Duration,
    /// Cap of the 429 backoff.
    pub rate_limit_cap: Duration,
    /// Retries after a network-level failure.
    pub network_retries: u32,
    /// Base of the network backoff.
    pub network_base: Duration,
}

impl RetryPolicy {
    /// Creates a policy with default limits.
    pub fn new() -> Self {
        Self {
            auth_retries: 1,
            rate_limit_retries: 3,
            rate_limit_base: Duration::from_secs(2),
            rate_limit_cap: Duration::from_secs(60),
            network_retries: 3,
            network_base: Duration::from_secs(2),
        }
    }

    /// Same limits, no waiting. For tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            rate_limit_base: Duration::ZERO,
            rate_limit_cap: Duration::ZERO,
            network_base: Duration::ZERO,
            ..Self::new()
        }
    }

    /// Builds a policy from session configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            auth_retries: config.auth_retries,
            rate_limit_retries: config.rate_limit_retries,
            rate_limit_base: Duration::from_millis(config.rate_limit_base_ms),
            rate_limit_cap: Duration::from_millis(config.rate_limit_cap_ms),
            network_retries: config.network_retries,
            network_base: Duration::from_millis(config.network_base_ms),
        }
    }

    /// Sets the number of 429 retries.
    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    /// Sets the number of network retries.
    pub fn with_network_retries(mut self, retries: u32) -> Self {
        self.network_retries = retries;
        self
    }

    /// Delay before the 429 retry numbered `attempt` (counting from zero).
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let backoff = self.rate_limit_base.saturating_mul(factor);
        backoff
            .max(retry_after.unwrap_or(Duration::ZERO))
            .min(self.rate_limit_cap)
    }

    /// Delay before the network retry numbered `attempt` (counting from one).
    pub fn network_delay(&self, attempt: u32) -> Duration {
        self.network_base.saturating_mul(attempt.max(1))
    }

    /// Determines if a transport error may be retried without
    /// re-authorizing.
    pub fn should_retry(&self, error: &TransportError) -> bool {
        match error.category() {
            FailureCategory::RateLimited => self.rate_limit_retries > 0,
            FailureCategory::Network | FailureCategory::Server => self.network_retries > 0,
            FailureCategory::Auth | FailureCategory::Client => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_exponential_backoff() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.rate_limit_delay(0, None), Duration::from_secs(2));
        assert_eq!(policy.rate_limit_delay(1, None), Duration::from_secs(4));
        assert_eq!(policy.rate_limit_delay(2, None), Duration::from_secs(8));
    }

    #[test]
    fn test_rate_limit_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.rate_limit_delay(10, None), Duration::from_secs(60));
        assert_eq!(policy.rate_limit_delay(40, None), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_wins_when_larger() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.rate_limit_delay(0, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.rate_limit_delay(0, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
        assert_eq!(
            policy.rate_limit_delay(2, Some(Duration::from_secs(1))),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn test_network_linear_backoff() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.network_delay(1), Duration::from_secs(2));
        assert_eq!(policy.network_delay(2), Duration::from_secs(4));
        assert_eq!(policy.network_delay(3), Duration::from_secs(6));
    }

    #[test]
    fn test_immediate_policy_has_no_delays() {
        let policy = RetryPolicy::immediate();
        assert_eq!(policy.rate_limit_delay(3, Some(Duration::from_secs(9))), Duration::ZERO);
        assert_eq!(policy.network_delay(3), Duration::ZERO);
        assert_eq!(policy.rate_limit_retries, 3);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&TransportError::Timeout));
        assert!(policy.should_retry(&TransportError::Server { status: 502 }));
        assert!(policy.should_retry(&TransportError::RateLimited { retry_after: None }));
        assert!(!policy.should_retry(&TransportError::AuthRejected { status: 401 }));
        assert!(!policy.should_retry(&TransportError::Status { status: 404 }));

        let no_network = RetryPolicy::default().with_network_retries(0);
        assert!(!no_network.should_retry(&TransportError::Timeout));
    }
}
