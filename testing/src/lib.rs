//! # Walkin Testing
//!
//! Testing utilities and helpers for the walk-in queue client.
//!
//! This crate provides:
//! - Deterministic clocks for staleness and debounce checks
//! - A Given-When-Then builder for reducers
//! - Helpers that run or inspect the effects a reducer returned
//!
//! ## Example
//!
//! ```ignore
//! use walkin_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(StatusReducer::new())
//!     .with_env(test_environment())
//!     .given_state(StatusState::new(otp, queue_id))
//!     .when_action(StatusAction::Stop)
//!     .then_state(|s| assert!(s.stopped))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use walkin_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use walkin_testing::mocks::FixedClock;
    /// use walkin_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Shared through an `Arc` between the test and the environment under test.
    #[derive(Debug)]
    pub struct MockClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl MockClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = match self.time.lock() {
                Ok(time) => time,
                Err(poisoned) => poisoned.into_inner(),
            };
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            let mut time = match self.time.lock() {
                Ok(time) => time,
                Err(poisoned) => poisoned.into_inner(),
            };
            *time = to;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            match self.time.lock() {
                Ok(time) => *time,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    /// 2025-01-01 00:00:00 UTC
    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(1_735_689_600)
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// Create a mock clock starting at 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn mock_clock() -> MockClock {
        MockClock::new(epoch())
    }
}

/// Helpers for driving the effects a reducer returned without a Store
pub mod effects {
    use std::time::Duration;
    use walkin_core::effect::Effect;

    /// Await every `Future` effect (recursively) and collect the actions they produce
    ///
    /// `Delay` effects are skipped; inspect them with [`delayed_actions`].
    /// `Cancellable` wrappers are unwrapped and `Cancel` is ignored.
    pub async fn run_effects<A, I>(effects: I) -> Vec<A>
    where
        I: IntoIterator<Item = Effect<A>>,
    {
        let mut produced = Vec::new();
        let mut pending: Vec<Effect<A>> = effects.into_iter().collect();
        pending.reverse();

        while let Some(effect) = pending.pop() {
            match effect {
                Effect::Future(fut) => {
                    if let Some(action) = fut.await {
                        produced.push(action);
                    }
                },
                Effect::Parallel(inner) | Effect::Sequential(inner) => {
                    pending.extend(inner.into_iter().rev());
                },
                Effect::Cancellable { effect, .. } => pending.push(*effect),
                Effect::None | Effect::Delay { .. } | Effect::Cancel(_) => {},
            }
        }

        produced
    }

    /// Every `Delay` in `effects` (recursively) as `(duration, action)` pairs
    pub fn delayed_actions<A: Clone>(effects: &[Effect<A>]) -> Vec<(Duration, A)> {
        let mut found = Vec::new();
        for effect in effects {
            collect_delays(effect, &mut found);
        }
        found
    }

    fn collect_delays<A: Clone>(effect: &Effect<A>, found: &mut Vec<(Duration, A)>) {
        match effect {
            Effect::Delay { duration, action } => found.push((*duration, (**action).clone())),
            Effect::Parallel(inner) | Effect::Sequential(inner) => {
                for effect in inner {
                    collect_delays(effect, found);
                }
            },
            Effect::Cancellable { effect, .. } => collect_delays(effect, found),
            Effect::None | Effect::Future(_) | Effect::Cancel(_) => {},
        }
    }

    /// Ids cancelled by `Cancel` effects in `effects` (recursively)
    pub fn cancelled_ids<A>(effects: &[Effect<A>]) -> Vec<&'static str> {
        let mut ids = Vec::new();
        let mut stack: Vec<&Effect<A>> = effects.iter().collect();
        while let Some(effect) = stack.pop() {
            match effect {
                Effect::Cancel(id) => ids.push(id.as_str()),
                Effect::Parallel(inner) | Effect::Sequential(inner) => stack.extend(inner),
                Effect::Cancellable { effect, .. } => stack.push(effect),
                Effect::None | Effect::Delay { .. } | Effect::Future(_) => {},
            }
        }
        ids
    }
}

/// Install a test tracing subscriber once per process
///
/// Honors `RUST_LOG`; output is captured by the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use effects::{cancelled_ids, delayed_actions, run_effects};
pub use mocks::{FixedClock, MockClock, mock_clock, test_clock};
