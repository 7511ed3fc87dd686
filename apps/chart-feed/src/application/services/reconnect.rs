//! Reconnection Policy
//!
//! Exponential backoff with jitter, shared by the WebSocket adapter (transport
//! reconnects) and live subscriptions (resubscribe after a connection loss).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum number of attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Config with no jitter and a fixed attempt budget.
    #[must_use]
    pub const fn fixed(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }
}

/// Backoff state for one retry sequence.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use chart_feed::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(
///     Duration::from_millis(100),
///     Duration::from_secs(1),
///     2,
/// ));
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(), None);
///
/// policy.reset();
/// assert!(policy.should_retry());
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.jittered(self.current_delay);
        let grown = scale(self.current_delay, self.config.multiplier.max(1.0))
            .unwrap_or(self.config.max_delay);
        self.current_delay = grown.min(self.config.max_delay);

        Some(delay)
    }

    /// Start over after a success.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }

        let factor = self.config.jitter_factor.min(1.0);
        let jitter = rand::rng().random_range((1.0 - factor)..=(1.0 + factor));
        scale(delay, jitter)
            .unwrap_or(delay)
            .max(Duration::from_millis(1))
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale(delay: Duration, factor: f64) -> Option<Duration> {
    let nanos = (delay.as_nanos() as f64 * factor).round();
    (nanos.is_finite() && nanos >= 0.0 && nanos < u64::MAX as f64)
        .then(|| Duration::from_nanos(nanos as u64))
}

/// Error type for retry sequences.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError<E> {
    /// The attempt budget ran out; carries the last failure.
    #[error("gave up after {attempts} attempts: {last}")]
    MaxAttemptsExceeded {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        last: E,
    },
    /// A failure that retrying cannot fix.
    #[error("{0}")]
    Permanent(E),
    /// Cancelled while waiting between attempts.
    #[error("retry cancelled")]
    Cancelled,
}

impl<E> ReconnectError<E> {
    /// The underlying failure, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::MaxAttemptsExceeded { last, .. } | Self::Permanent(last) => Some(last),
            Self::Cancelled => None,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy gives up.
///
/// `is_transient` decides which failures are retried.
///
/// # Errors
///
/// Returns the last failure wrapped in [`ReconnectError`].
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &mut ReconnectPolicy,
    cancel: &CancellationToken,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, ReconnectError<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let error = match op().await {
            Ok(value) => {
                policy.reset();
                return Ok(value);
            }
            Err(e) if !is_transient(&e) => return Err(ReconnectError::Permanent(e)),
            Err(e) => e,
        };

        let Some(delay) = policy.next_delay() else {
            return Err(ReconnectError::MaxAttemptsExceeded {
                attempts: policy.attempt_count(),
                last: error,
            });
        };

        tracing::warn!(
            attempt = policy.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying after transient failure"
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(ReconnectError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn no_jitter(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig::fixed(Duration::from_millis(100), Duration::from_secs(10), max_attempts)
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn policy_exponential_backoff() {
        let mut policy = ReconnectPolicy::new(no_jitter(0));

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn policy_max_delay_cap() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            multiplier: 4.0,
            ..ReconnectConfig::fixed(Duration::from_secs(1), Duration::from_secs(2), 0)
        });

        let _ = policy.next_delay();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn policy_max_attempts_and_reset() {
        let mut policy = ReconnectPolicy::new(no_jitter(2));

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn policy_jitter_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor: 0.1,
                ..ReconnectConfig::fixed(Duration::from_secs(1), Duration::from_secs(10), 0)
            });

            let millis = policy.next_delay().unwrap().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of bounds");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_after_transient_failures() {
        let mut policy = ReconnectPolicy::new(no_jitter(5));
        let calls = AtomicU32::new(0);

        let result: Result<u32, ReconnectError<String>> = retry_with_backoff(
            &mut policy,
            &CancellationToken::new(),
            |_| true,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(format!("fail {n}")) } else { Ok(n) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(policy.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_permanent_failure() {
        let mut policy = ReconnectPolicy::new(no_jitter(5));
        let calls = AtomicU32::new(0);

        let result: Result<(), ReconnectError<String>> = retry_with_backoff(
            &mut policy,
            &CancellationToken::new(),
            |e: &String| e != "fatal",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            },
        )
        .await;

        assert!(matches!(result, Err(ReconnectError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_budget() {
        let mut policy = ReconnectPolicy::new(no_jitter(2));

        let result: Result<(), ReconnectError<String>> = retry_with_backoff(
            &mut policy,
            &CancellationToken::new(),
            |_| true,
            || async { Err("down".to_string()) },
        )
        .await;

        match result {
            Err(ReconnectError::MaxAttemptsExceeded { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, "down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_observes_cancellation() {
        let mut policy = ReconnectPolicy::new(no_jitter(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), ReconnectError<String>> =
            retry_with_backoff(&mut policy, &cancel, |_| true, || async {
                Err("down".to_string())
            })
            .await;

        assert!(matches!(result, Err(ReconnectError::Cancelled)));
    }
}
