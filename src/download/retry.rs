//! Retry policy for batch fetches
//!
//! A failed batch fetch is classified before anything sleeps: transient
//! transport trouble backs off exponentially, a 429 sits out the origin's
//! cooldown, and anything else fails the download immediately.

use crate::config::RetryConfig;
use crate::TideError;
use std::time::Duration;

/// How a failed fetch attempt should be handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient; retry after exponential backoff
    Retryable,
    /// Origin asked us to slow down; retry after the configured cooldown
    RateLimited,
    /// No retry will help
    Fatal,
}

/// Classifies a fetch error into a retry decision
pub fn classify_failure(error: &TideError) -> FailureKind {
    match error {
        TideError::Timeout { .. } => FailureKind::Retryable,
        TideError::Http { source, .. } => classify_reqwest(source),
        TideError::Reqwest(source) => classify_reqwest(source),
        _ => FailureKind::Fatal,
    }
}

fn classify_reqwest(error: &reqwest::Error) -> FailureKind {
    if let Some(status) = error.status() {
        if status.as_u16() == 429 {
            return FailureKind::RateLimited;
        }
        if status.is_server_error() {
            return FailureKind::Retryable;
        }
        return FailureKind::Fatal;
    }
    if error.is_timeout() || error.is_connect() {
        return FailureKind::Retryable;
    }
    FailureKind::Fatal
}

/// Bounded exponential backoff derived from the download config
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    rate_limit_cooldown: Duration,
}

impl BackoffPolicy {
    pub fn new(retry: &RetryConfig, rate_limit_cooldown_secs: u64) -> Self {
        Self {
            max_attempts: retry.max_attempts,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            rate_limit_cooldown: Duration::from_secs(rate_limit_cooldown_secs),
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling each time
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        self.rate_limit_cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(
            &RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1000,
                max_delay_ms: 30_000,
            },
            60,
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let error = TideError::Timeout {
            url: "https://e".to_string(),
        };
        assert_eq!(classify_failure(&error), FailureKind::Retryable);
    }

    #[test]
    fn test_storage_error_is_fatal() {
        let error = TideError::Download {
            source_id: 1,
            message: "bad payload".to_string(),
        };
        assert_eq!(classify_failure(&error), FailureKind::Fatal);
    }
}
