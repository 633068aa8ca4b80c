//! Integration tests for the join page
//!
//! Covers rehydrating a cached ticket against the server and the join flow,
//! including declined and timed-out joins.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use std::time::Duration;
use walkin_client::api::mock::MockQueueApi;
use walkin_client::presentation::recording::{Call, RecordingPresenter};
use walkin_client::storage::MemoryStorage;
use walkin_client::ticket_store::TicketStore;
use walkin_client::{
    ApiError, ClientConfig, JoinPage, Navigation, Otp, PageParts, QueueId, Snapshot, Ticket, TicketStatus,
};
use walkin_testing::{MockClock, mock_clock};

struct Harness {
    config: ClientConfig,
    storage: Arc<MemoryStorage>,
    clock: Arc<MockClock>,
    api: Arc<MockQueueApi>,
    presenter: Arc<RecordingPresenter>,
}

impl Harness {
    fn new(api: MockQueueApi) -> Self {
        Self {
            config: ClientConfig::default(),
            storage: Arc::new(MemoryStorage::new()),
            clock: Arc::new(mock_clock()),
            api: Arc::new(api),
            presenter: Arc::new(RecordingPresenter::new()),
        }
    }

    fn tickets(&self) -> TicketStore {
        TicketStore::new(
            self.storage.clone(),
            self.clock.clone(),
            self.config.staleness_threshold(),
        )
    }

    fn page(&self) -> JoinPage {
        let parts = PageParts {
            storage: self.storage.clone(),
            api: self.api.clone(),
            connector: None,
            presenter: self.presenter.clone(),
            clock: self.clock.clone(),
        };
        JoinPage::new(&self.config, parts, queue())
    }
}

fn queue() -> QueueId {
    QueueId::new("queue42")
}

fn ticket(otp: &str, position: u32) -> Ticket {
    Ticket {
        otp: Otp::new(otp),
        cashier_number: Some(1),
        position,
        status: TicketStatus::Waiting,
        estimated_wait_seconds: 600,
        last_update: None,
    }
}

#[tokio::test]
async fn test_empty_cache_shows_join_form() {
    let h = Harness::new(MockQueueApi::new());
    let page = h.page();

    assert!(page.rehydrate().await.unwrap().is_none());
    page.close().await.unwrap();

    assert_eq!(h.presenter.calls(), vec![Call::ShowJoinForm(queue())]);
    assert_eq!(h.api.check_calls(), 0);
}

#[tokio::test]
async fn test_cached_ticket_is_refreshed_from_server() {
    let h = Harness::new(
        MockQueueApi::new().with_status(Ok(Snapshot::new(2, TicketStatus::Waiting, 120).with_cashier(1))),
    );
    h.tickets().save(&queue(), ticket("AB12", 5));
    let page = h.page();

    let shown = page.rehydrate().await.unwrap().unwrap();
    page.close().await.unwrap();

    assert_eq!(shown.position, 2);
    assert_eq!(h.tickets().load(&queue()).unwrap().position, 2);
    let positions: Vec<_> = h
        .presenter
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::ShowTicket(view) => Some(view.position),
            _ => None,
        })
        .collect();
    assert_eq!(positions, vec![5, 2]);
}

#[tokio::test]
async fn test_finished_cached_ticket_reverts_to_join_form() {
    let h = Harness::new(MockQueueApi::new().with_status(Ok(Snapshot::new(0, TicketStatus::Served, 0))));
    h.tickets().save(&queue(), ticket("AB12", 1));
    let page = h.page();

    assert!(page.rehydrate().await.unwrap().is_none());
    page.close().await.unwrap();

    assert!(h.tickets().load(&queue()).is_none());
    assert_eq!(h.presenter.calls().last(), Some(&Call::ShowJoinForm(queue())));
}

#[tokio::test]
async fn test_unreachable_server_keeps_cached_ticket() {
    let h = Harness::new(MockQueueApi::new().with_status(Err(ApiError::Network("refused".to_string()))));
    h.tickets().save(&queue(), ticket("AB12", 4));
    let page = h.page();

    let shown = page.rehydrate().await.unwrap().unwrap();
    page.close().await.unwrap();

    assert_eq!(shown.position, 4);
    assert!(h.tickets().load(&queue()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_rehydrate_resolves_when_verification_lands() {
    let api = MockQueueApi::new();
    api.push_status(
        Duration::from_secs(2),
        Ok(Snapshot::new(1, TicketStatus::Waiting, 60).with_cashier(1)),
    );
    let h = Harness::new(api);
    h.tickets().save(&queue(), ticket("AB12", 5));
    let page = h.page();

    let started = tokio::time::Instant::now();
    let shown = page.rehydrate().await.unwrap().unwrap();
    let waited = started.elapsed();
    page.close().await.unwrap();

    assert_eq!(shown.position, 1);
    assert!(waited >= Duration::from_secs(2), "returned after {waited:?}");
    assert!(waited < Duration::from_secs(3), "returned after {waited:?}");
    assert!(!page.state().await.verifying);
}

#[tokio::test(start_paused = true)]
async fn test_rehydrate_gives_up_waiting_after_join_timeout() {
    let api = MockQueueApi::new();
    api.push_status(
        Duration::from_secs(120),
        Ok(Snapshot::new(1, TicketStatus::Waiting, 60).with_cashier(1)),
    );
    let h = Harness::new(api);
    h.tickets().save(&queue(), ticket("AB12", 5));
    let page = h.page();

    let started = tokio::time::Instant::now();
    let shown = page.rehydrate().await.unwrap().unwrap();

    assert_eq!(shown.position, 5);
    let waited = started.elapsed();
    assert!(waited >= h.config.join_timeout, "returned after {waited:?}");
    assert!(waited < h.config.join_timeout + Duration::from_secs(1), "returned after {waited:?}");
    assert!(page.state().await.verifying);
}

#[tokio::test]
async fn test_join_persists_ticket_and_opens_status_page() {
    let h = Harness::new(MockQueueApi::new().with_join(Ok(ticket("CD34", 7))));
    let page = h.page();

    let otp = page.join().await.unwrap();
    page.close().await.unwrap();

    assert_eq!(otp, Some(Otp::new("CD34")));
    let cached = h.tickets().load(&queue()).unwrap();
    assert_eq!(cached.otp, Otp::new("CD34"));
    assert!(cached.last_update.is_some());
    assert_eq!(
        h.presenter.navigations(),
        vec![Navigation::StatusView { otp: Otp::new("CD34") }]
    );
}

#[tokio::test]
async fn test_declined_join_shows_server_reason() {
    let h = Harness::new(MockQueueApi::new().with_join(Err(ApiError::Rejected("Queue is closed".to_string()))));
    let page = h.page();

    assert!(page.join().await.unwrap().is_none());
    page.close().await.unwrap();

    assert_eq!(h.presenter.messages(), vec!["Queue is closed".to_string()]);
    assert_eq!(h.presenter.calls().last(), Some(&Call::Joining(false)));
    assert!(h.tickets().load(&queue()).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_join_times_out() {
    let api = MockQueueApi::new();
    api.push_join(Duration::from_secs(60), Ok(ticket("LATE", 1)));
    let h = Harness::new(api);
    let page = h.page();

    assert!(page.join().await.unwrap().is_none());
    page.close().await.unwrap();

    assert_eq!(
        h.presenter.messages(),
        vec!["Request timed out. Please try again.".to_string()]
    );
    assert!(!page.state().await.joining);
}
