//! Exponential backoff for reconnect scheduling.
//!
//! The policy only computes delays; callers schedule them as
//! [`Effect::Delay`](walkin_core::effect::Effect::Delay) so that the wait is
//! visible to reducers and cancellable like any other timer.
//!
//! # Example
//!
//! ```rust
//! use walkin_runtime::backoff::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::builder()
//!     .max_attempts(5)
//!     .initial_delay(Duration::from_secs(3))
//!     .max_delay(Duration::from_secs(30))
//!     .multiplier(1.5)
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(3));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4500));
//! assert!(policy.should_retry(5));
//! assert!(!policy.should_retry(6));
//! ```

use std::time::Duration;

/// Backoff policy configuration.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `initial_delay`: 3 seconds
/// - `max_delay`: 30 seconds
/// - `multiplier`: 1.5
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Number of attempts allowed before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackoffPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> BackoffPolicyBuilder {
        BackoffPolicyBuilder {
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Delay to wait before attempt number `attempt` (1-based).
    ///
    /// `initial_delay * multiplier ^ (attempt - 1)`, capped at `max_delay`.
    /// Attempt 0 is treated as attempt 1.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap_ms = self.max_delay.as_millis() as f64;

        if !delay_ms.is_finite() || delay_ms >= cap_ms {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Whether attempt number `attempt` (1-based) is still allowed.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

/// Builder for [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct BackoffPolicyBuilder {
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl BackoffPolicyBuilder {
    /// Set the number of attempts allowed.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the delay before the first attempt.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the cap for any single delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the growth factor between attempts.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`BackoffPolicy`].
    #[must_use]
    pub fn build(self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts.unwrap_or(5),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_secs(3)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(1.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_delay_grows_by_multiplier() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(3000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(6750));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(10125));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::default();

        // 3000 * 1.5^6 = 34171ms
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_attempt_zero_uses_initial_delay() {
        let policy = BackoffPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
    }

    #[test]
    fn test_should_retry_stops_after_max_attempts() {
        let policy = BackoffPolicy::builder().max_attempts(2).build();

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap_and_never_shrinks(
            initial_ms in 1u64..10_000,
            multiplier in 1.0f64..4.0,
            attempt in 1u32..64,
        ) {
            let policy = BackoffPolicy::builder()
                .initial_delay(Duration::from_millis(initial_ms))
                .max_delay(Duration::from_secs(30))
                .multiplier(multiplier)
                .build();

            let current = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);

            prop_assert!(current <= policy.max_delay);
            prop_assert!(next >= current);
        }
    }
}
