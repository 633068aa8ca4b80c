//! Integration tests for Store effect execution
//!
//! Covers ordering of sequential effects, broadcast of effect-produced
//! actions, and cancellation of in-flight work by id.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
#![allow(clippy::match_same_arms)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use walkin_core::{
    SmallVec,
    effect::{Effect, EffectId},
    reducer::Reducer,
    smallvec,
};
use walkin_runtime::{Store, StoreConfig, StoreError};

// ============================================================================
// Test Fixtures
// ============================================================================

const LOOKUP: EffectId = EffectId::new("lookup");

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    /// Start a slow lookup; a newer lookup supersedes an older one
    Lookup { id: u32, millis: u64 },
    /// Lookup finished
    Found { id: u32 },
    /// Drop the in-flight lookup
    Abandon,
    /// Run three steps in order
    Steps,
    /// One step finished
    Step(u32),
    /// Run two lookups side by side
    Both,
}

#[derive(Debug, Clone, Default)]
struct TestState {
    found: Vec<u32>,
    steps: Vec<u32>,
}

#[derive(Clone)]
struct TestEnvironment {
    log: Arc<Mutex<Vec<String>>>,
}

struct TestReducer;

impl Reducer for TestReducer {
    type State = TestState;
    type Action = TestAction;
    type Environment = TestEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TestAction::Lookup { id, millis } => {
                smallvec![
                    Effect::future(async move {
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                        Some(TestAction::Found { id })
                    })
                    .cancellable(LOOKUP)
                ]
            },
            TestAction::Found { id } => {
                state.found.push(id);
                smallvec![Effect::None]
            },
            TestAction::Abandon => smallvec![Effect::Cancel(LOOKUP)],
            TestAction::Steps => {
                let steps = (1..=3)
                    .map(|n| {
                        let log = Arc::clone(&env.log);
                        Effect::future(async move {
                            // Later steps finish faster; ordering must still hold
                            tokio::time::sleep(Duration::from_millis(u64::from(40 - n * 10)))
                                .await;
                            log.lock().await.push(format!("step {n}"));
                            Some(TestAction::Step(n))
                        })
                    })
                    .collect();
                smallvec![Effect::chain(steps)]
            },
            TestAction::Step(n) => {
                state.steps.push(n);
                smallvec![Effect::None]
            },
            TestAction::Both => smallvec![Effect::merge(vec![
                Effect::delay(Duration::from_millis(20), TestAction::Found { id: 1 }),
                Effect::delay(Duration::from_millis(10), TestAction::Found { id: 2 }),
            ])],
        }
    }
}

fn test_store() -> Store<TestState, TestAction, TestEnvironment, TestReducer> {
    Store::new(
        TestState::default(),
        TestReducer,
        TestEnvironment {
            log: Arc::new(Mutex::new(Vec::new())),
        },
    )
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_newer_lookup_supersedes_older() {
    let store = test_store();

    store.send(TestAction::Lookup { id: 1, millis: 100 }).await.unwrap();
    store.send(TestAction::Lookup { id: 2, millis: 100 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(store.state(|s| s.found.clone()).await, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_lookup_never_reports() {
    let store = test_store();
    let mut rx = store.subscribe_actions();

    store.send(TestAction::Lookup { id: 1, millis: 100 }).await.unwrap();
    store.send(TestAction::Abandon).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(store.state(|s| s.found.is_empty()).await);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_without_running_effect_is_noop() {
    let store = test_store();

    store.send(TestAction::Abandon).await.unwrap();
    assert!(!store.cancel(LOOKUP));
}

#[tokio::test(start_paused = true)]
async fn test_finished_lookup_can_be_restarted() {
    let store = test_store();

    store.send(TestAction::Lookup { id: 1, millis: 10 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.send(TestAction::Lookup { id: 2, millis: 10 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.state(|s| s.found.clone()).await, vec![1, 2]);
}

// ============================================================================
// Composition
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sequential_effects_run_in_order() {
    let store = test_store();

    store.send(TestAction::Steps).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.state(|s| s.steps.clone()).await, vec![1, 2, 3]);
    let log = store.environment().log.lock().await.clone();
    assert_eq!(log, vec!["step 1", "step 2", "step 3"]);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_effects_complete_independently() {
    let store = test_store();
    let mut rx = store.subscribe_actions();

    store.send(TestAction::Both).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), TestAction::Found { id: 2 });
    assert_eq!(rx.recv().await.unwrap(), TestAction::Found { id: 1 });
}

// ============================================================================
// Observation and Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_send_and_wait_for_times_out_after_abandon() {
    let store = test_store();

    store.send(TestAction::Lookup { id: 9, millis: 1_000 }).await.unwrap();
    let result = store
        .send_and_wait_for(
            TestAction::Abandon,
            |a| matches!(a, TestAction::Found { .. }),
            Duration::from_secs(5),
        )
        .await;

    assert!(matches!(result, Err(StoreError::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_uncancellable_work() {
    let store = Store::with_config(
        TestState::default(),
        TestReducer,
        TestEnvironment {
            log: Arc::new(Mutex::new(Vec::new())),
        },
        StoreConfig::default().with_shutdown_timeout(Duration::from_secs(1)),
    );

    store.send(TestAction::Steps).await.unwrap();
    store.shutdown_default().await.unwrap();

    let log = store.environment().log.lock().await.clone();
    assert_eq!(log.len(), 3);
}
