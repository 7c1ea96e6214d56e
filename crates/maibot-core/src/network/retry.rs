//! Retry logic with exponential backoff and jitter.
//!
//! Used for GitHub API calls and archive downloads. Delays double with each
//! attempt, are capped, and are scaled by a random factor so parallel
//! launcher instances do not retry in lockstep.

use crate::config::{InstallationConfig, NetworkConfig};
use crate::error::LauncherError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed-interval policy for archive downloads.
    pub fn for_downloads() -> Self {
        Self {
            max_attempts: InstallationConfig::DOWNLOAD_RETRY_ATTEMPTS,
            base_delay: NetworkConfig::DOWNLOAD_RETRY_DELAY,
            max_delay: NetworkConfig::DOWNLOAD_RETRY_DELAY,
            exponential_base: 1.0,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the given 0-indexed attempt.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let max_secs = self.max_delay.as_secs_f64();
        let secs = (self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32))
            .min(max_secs);

        let secs = if self.jitter {
            // Factor in [0.5, 1.5) keeps the mean delay unchanged.
            (secs * rand::rng().random_range(0.5..1.5)).min(max_secs)
        } else {
            secs
        };
        Duration::from_secs_f64(secs)
    }
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Default predicate: network trouble is retried, everything else is not.
pub fn is_retryable_error(err: &LauncherError) -> bool {
    err.is_retryable()
}

/// Retry an async operation with exponential backoff.
///
/// `should_retry` decides whether a given error is worth another attempt.
/// Returns the final result together with statistics about the attempts.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;
        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Succeeded after {} attempts", stats.attempts);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };
        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!("Not retrying: {}", err);
            return (Err(err), stats);
        }
        if stats.attempts >= max_attempts {
            warn!("Giving up after {} attempts: {}", max_attempts, err);
            return (Err(err), stats);
        }

        let delay = config.calculate_delay(attempt);
        stats.total_delay += delay;
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            stats.attempts, max_attempts, err, delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(4));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_with_jitter_stays_in_range() {
        let config = RetryConfig::new().with_base_delay(Duration::from_secs(2));
        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_download_policy_is_fixed_interval() {
        let config = RetryConfig::for_downloads();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.calculate_delay(0), Duration::from_secs(3));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let config = RetryConfig::new().with_max_attempts(3).with_jitter(false);
        let counter = Arc::new(AtomicU32::new(0));

        let (result, stats) = retry_async(
            &config,
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(LauncherError::Timeout(Duration::from_secs(1)))
                    } else {
                        Ok(7)
                    }
                }
            },
            is_retryable_error,
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.total_delay, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let config = RetryConfig::new().with_max_attempts(2).with_jitter(false);

        let (result, stats) = retry_async(
            &config,
            || async { Err::<(), _>("always fails".to_string()) },
            |_: &String| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 2);
        assert!(!stats.success);
        assert_eq!(stats.last_error.as_deref(), Some("always fails"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let config = RetryConfig::new();

        let (result, stats) = retry_async(
            &config,
            || async {
                Err::<(), _>(LauncherError::InvalidVersion {
                    version: "x".into(),
                })
            },
            is_retryable_error,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
    }
}
