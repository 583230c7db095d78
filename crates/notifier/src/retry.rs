//! Backoff policy for chat delivery.

use std::time::Duration;

use async_trait::async_trait;

/// Retry limits for a single message.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per message, the first one included (default: 5).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 1 second).
    pub base_delay: Duration,
    /// Upper bound for any backoff delay (default: 30 seconds).
    pub max_delay: Duration,
    /// Wait used when a rate-limit reply carries no hint (default: 5 seconds).
    pub default_rate_limit_wait: Duration,
    /// Consecutive rate-limit waits tolerated before giving up (default: 10).
    pub max_rate_limit_waits: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            default_rate_limit_wait: Duration::from_secs(5),
            max_rate_limit_waits: 10,
        }
    }
}

impl RetryConfig {
    /// Delay before retry `retry` (1-based): `min(base * 2^(retry-1), max)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exp = 2u64.saturating_pow(retry.saturating_sub(1));
        let base_ms = self.base_delay.as_millis() as u64;
        let capped_ms = base_ms
            .saturating_mul(exp)
            .min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped_ms)
    }

    /// Wait before retrying a rate-limited send.
    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.default_rate_limit_wait)
    }
}

/// Source of delays, swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delays on the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(5), Duration::from_secs(16));
        assert_eq!(config.backoff_delay(6), Duration::from_secs(30));
        assert_eq!(config.backoff_delay(64), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limit_wait_prefers_hint() {
        let config = RetryConfig::default();
        assert_eq!(
            config.rate_limit_wait(Some(Duration::from_secs(12))),
            Duration::from_secs(12)
        );
        assert_eq!(config.rate_limit_wait(None), Duration::from_secs(5));
    }
}
