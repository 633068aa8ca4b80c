//! # Walkin Runtime
//!
//! Runtime implementation for the walk-in queue client.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation Registry**: Aborts superseded effects by [`EffectId`]
//! - **Backoff**: Exponential delay policy used for reconnect scheduling
//!
//! ## Example
//!
//! ```ignore
//! use walkin_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::Start).await?;
//!
//! // Read state
//! let status = store.state(|s| s.rendered_status.clone()).await;
//! ```

use futures::future::{AbortHandle, Abortable, BoxFuture};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use walkin_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};

/// Exponential backoff policy
pub mod backoff;

pub use backoff::BackoffPolicy;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Configuration for Store instances
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(2));
///
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of actions buffered for slow observers
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registry of running cancellable effects
///
/// Each registration carries a token so that an effect finishing late never
/// removes the registration of the effect that replaced it.
#[derive(Default)]
struct CancellationRegistry {
    next_token: AtomicU64,
    running: Mutex<HashMap<EffectId, (u64, AbortHandle)>>,
}

impl CancellationRegistry {
    /// Register `handle` under `id`, aborting whatever was running there
    fn register(&self, id: EffectId, handle: AbortHandle) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let previous = match self.running.lock() {
            Ok(mut running) => running.insert(id, (token, handle)),
            Err(poisoned) => poisoned.into_inner().insert(id, (token, handle)),
        };

        if let Some((_, previous)) = previous {
            tracing::trace!(effect_id = %id, "Aborting superseded effect");
            metrics::counter!("store.effects.cancelled", "reason" => "superseded").increment(1);
            previous.abort();
        }

        token
    }

    /// Remove the registration for `id` if it still belongs to `token`
    fn finish(&self, id: EffectId, token: u64) {
        let mut running = match self.running.lock() {
            Ok(running) => running,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.get(&id).is_some_and(|(current, _)| *current == token) {
            running.remove(&id);
        }
    }

    /// Abort the effect registered under `id`
    fn cancel(&self, id: EffectId) -> bool {
        let removed = match self.running.lock() {
            Ok(mut running) => running.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };

        removed.is_some_and(|(_, handle)| {
            handle.abort();
            true
        })
    }

    /// Abort every registered effect
    fn cancel_all(&self) -> usize {
        let drained: Vec<_> = match self.running.lock() {
            Ok(mut running) => running.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };

        for (_, (_, handle)) in &drained {
            handle.abort();
        }
        drained.len()
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        AbortHandle, Abortable, Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, BoxFuture,
        CancellationRegistry, Duration, Effect, EffectId, Ordering, Reducer, RwLock, StoreConfig,
        StoreError,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (page logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// Cloning a Store is cheap; clones share state and running effects.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: Arc<CancellationRegistry>,
        default_shutdown_timeout: Duration,
        /// Every action produced by an effect is broadcast here before it is
        /// fed back into the reducer.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: Arc::clone(&self.cancellations),
                default_shutdown_timeout: self.default_shutdown_timeout,
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: Arc::new(CancellationRegistry::default()),
                default_shutdown_timeout: config.default_shutdown_timeout,
                action_broadcast,
            }
        }

        /// The injected environment
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects
        ///
        /// `send()` returns once the effects are started, not when they complete.
        /// Cancellations in the returned effects take effect before `send()` returns.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::debug!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            tracing::trace!("Reducer returned {} effects", effects.len());
            for effect in effects {
                self.execute(effect);
            }

            Ok(())
        }

        /// Send an action and wait for a matching action produced by its effects
        ///
        /// Subscribes to the action broadcast before sending, so no matching
        /// action can be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let otp = store.state(|s| s.otp.clone()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Abort the effect running under `id`, if any
        ///
        /// Returns `true` if an effect was aborted.
        pub fn cancel(&self, id: EffectId) -> bool {
            let cancelled = self.cancellations.cancel(id);
            if cancelled {
                tracing::trace!(effect_id = %id, "Effect cancelled");
                metrics::counter!("store.effects.cancelled", "reason" => "explicit").increment(1);
            }
            cancelled
        }

        /// Shut down using the configured default timeout
        ///
        /// # Errors
        ///
        /// See [`Store::shutdown`].
        pub async fn shutdown_default(&self) -> Result<(), StoreError> {
            self.shutdown(self.default_shutdown_timeout).await
        }

        /// Initiate graceful shutdown of the store
        ///
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Aborts every cancellable effect (timers, in-flight polls)
        /// 3. Waits for the remaining effects to complete, up to `timeout`
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let aborted = self.cancellations.cancel_all();
            tracing::debug!(aborted, "Aborted cancellable effects");

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Start an effect
        ///
        /// `Cancel` and top-level `Parallel` are handled synchronously so that a
        /// cancellation returned alongside new work never races it.
        fn execute(&self, effect: Effect<A>) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Cancel(id) => {
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                    self.cancel(id);
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute(effect);
                    }
                },
                effect => {
                    let task = self.prepare(effect);

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    tokio::spawn(async move {
                        let _pending_guard = pending_guard;
                        task.await;
                    });
                },
            }
        }

        /// Turn an effect into a future that runs it to completion
        ///
        /// Cancellable registrations happen here, eagerly, so the abort handle
        /// exists before the returned future is first polled.
        fn prepare(&self, effect: Effect<A>) -> BoxFuture<'static, ()> {
            match effect {
                Effect::None => Box::pin(async {}),
                Effect::Cancel(id) => {
                    self.cancel(id);
                    Box::pin(async {})
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let store = self.clone();
                    Box::pin(async move {
                        if let Some(action) = fut.await {
                            store.feed_back(action).await;
                        }
                    })
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    let store = self.clone();
                    Box::pin(async move {
                        tokio::time::sleep(duration).await;
                        store.feed_back(*action).await;
                    })
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    let tasks: Vec<_> = effects.into_iter().map(|e| self.prepare(e)).collect();
                    Box::pin(async move {
                        futures::future::join_all(tasks).await;
                    })
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);
                    let store = self.clone();
                    Box::pin(async move {
                        for effect in effects {
                            store.prepare(effect).await;
                        }
                    })
                },
                Effect::Cancellable { id, effect } => {
                    let (handle, registration) = AbortHandle::new_pair();
                    let token = self.cancellations.register(id, handle);
                    let task = self.prepare(*effect);
                    let cancellations = Arc::clone(&self.cancellations);

                    Box::pin(async move {
                        if Abortable::new(task, registration).await.is_err() {
                            tracing::trace!(effect_id = %id, "Cancellable effect aborted");
                        }
                        cancellations.finish(id, token);
                    })
                },
            }
        }

        /// Broadcast an effect-produced action, then feed it back into the reducer
        async fn feed_back(&self, action: A) {
            let _ = self.action_broadcast.send(action.clone());

            if let Err(error) = self.send(action).await {
                tracing::debug!(error = %error, "Dropped action produced by effect");
            }
        }
    }
}

pub use store::Store;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

    use super::*;
    use walkin_core::{SmallVec, smallvec};

    const TIMER: EffectId = EffectId::new("timer");

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        StartTimer { millis: u64 },
        StopTimer,
        Fired,
        Emit(u32),
        Emitted(u32),
    }

    #[derive(Debug, Default)]
    struct TestState {
        fired: u32,
        emitted: Vec<u32>,
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut TestState,
            action: TestAction,
            _env: &(),
        ) -> SmallVec<[Effect<TestAction>; 4]> {
            match action {
                TestAction::StartTimer { millis } => smallvec![
                    Effect::delay(Duration::from_millis(millis), TestAction::Fired)
                        .cancellable(TIMER)
                ],
                TestAction::StopTimer => smallvec![Effect::Cancel(TIMER)],
                TestAction::Fired => {
                    state.fired += 1;
                    smallvec![Effect::None]
                },
                TestAction::Emit(value) => {
                    smallvec![Effect::future(async move { Some(TestAction::Emitted(value)) })]
                },
                TestAction::Emitted(value) => {
                    state.emitted.push(value);
                    smallvec![Effect::None]
                },
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_feeds_action_back() {
        let store = Store::new(TestState::default(), TestReducer, ());

        store.send(TestAction::StartTimer { millis: 100 }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.state(|s| s.fired).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_timer() {
        let store = Store::new(TestState::default(), TestReducer, ());

        store.send(TestAction::StartTimer { millis: 100 }).await.unwrap();
        store.send(TestAction::StopTimer).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.state(|s| s.fired).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarting_cancellable_supersedes_previous() {
        let store = Store::new(TestState::default(), TestReducer, ());

        store.send(TestAction::StartTimer { millis: 100 }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.send(TestAction::StartTimer { millis: 100 }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Only the second timer fires
        assert_eq!(store.state(|s| s.fired).await, 1);
    }

    #[tokio::test]
    async fn test_send_and_wait_for_effect_action() {
        let store = Store::new(TestState::default(), TestReducer, ());

        let result = store
            .send_and_wait_for(
                TestAction::Emit(7),
                |a| matches!(a, TestAction::Emitted(_)),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(result, TestAction::Emitted(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_timers_and_rejects_actions() {
        let store = Store::new(TestState::default(), TestReducer, ());

        store.send(TestAction::StartTimer { millis: 60_000 }).await.unwrap();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store.send(TestAction::Emit(1)).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        assert_eq!(store.state(|s| s.fired).await, 0);
    }
}
