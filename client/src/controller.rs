//! Page controllers.
//!
//! A controller owns the [`Store`] for one page and exposes only the narrow
//! set of handlers the page needs. Collaborators come in as [`PageParts`],
//! either built from [`ClientConfig`] for production or injected by tests.

use crate::api::{HttpQueueApi, QueueApi};
use crate::channel::{ChannelEvent, Connector, RealtimeChannel, WebSocketConnector};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::join::{JoinAction, JoinEnvironment, JoinReducer, JoinState};
use crate::poller::StatusPoller;
use crate::preferences::Preferences;
use crate::presentation::PresentationAdapter;
use crate::reconcile::{StatusAction, StatusEnvironment, StatusReducer, StatusState};
use crate::storage::{FileStorage, Storage};
use crate::ticket::{Otp, QueueId, Ticket, TicketStatus};
use crate::ticket_store::TicketStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use walkin_core::environment::{Clock, SystemClock};
use walkin_runtime::Store;

type StatusStore = Store<StatusState, StatusAction, StatusEnvironment, StatusReducer>;
type JoinStore = Store<JoinState, JoinAction, JoinEnvironment, JoinReducer>;

/// Collaborators shared by both pages
#[derive(Clone)]
pub struct PageParts {
    /// Ticket cache and preferences backend
    pub storage: Arc<dyn Storage>,
    /// Queue server
    pub api: Arc<dyn QueueApi>,
    /// Push channel connector; `None` polls only
    pub connector: Option<Arc<dyn Connector>>,
    /// Where rendering goes
    pub presenter: Arc<dyn PresentationAdapter>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl PageParts {
    /// File storage, HTTP API, and WebSocket channel as configured
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the storage file exists but cannot be read.
    pub fn production(
        config: &ClientConfig,
        presenter: Arc<dyn PresentationAdapter>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            storage: Arc::new(FileStorage::open(&config.storage_path)?),
            api: Arc::new(HttpQueueApi::new(config.base_url.as_str(), config.join_timeout)),
            connector: Some(Arc::new(WebSocketConnector::new(config.ws_url.as_str()))),
            presenter,
            clock: Arc::new(SystemClock),
        })
    }

    fn tickets(&self, config: &ClientConfig) -> Arc<TicketStore> {
        Arc::new(TicketStore::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.clock),
            config.staleness_threshold(),
        ))
    }
}

impl std::fmt::Debug for PageParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageParts")
            .field("push_channel", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

/// Status page for one ticket
pub struct StatusPage {
    store: StatusStore,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    forwarder: Option<JoinHandle<()>>,
}

impl StatusPage {
    /// Production page for `otp` in `queue_id`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the storage file cannot be read.
    pub fn open(
        config: &ClientConfig,
        queue_id: QueueId,
        otp: Otp,
        presenter: Arc<dyn PresentationAdapter>,
    ) -> Result<Self, ClientError> {
        let parts = PageParts::production(config, presenter)?;
        Ok(Self::new(config.clone(), parts, queue_id, otp))
    }

    /// Page over injected collaborators
    ///
    /// The cached ticket for `queue_id` seeds the first render.
    #[must_use]
    pub fn new(config: ClientConfig, parts: PageParts, queue_id: QueueId, otp: Otp) -> Self {
        Self::build(config, parts, queue_id, otp, None)
    }

    /// Page that was last shown with `status`
    ///
    /// A `served` page plays its celebration shortly after start; a `serving`
    /// page replays the turn alert when sound is on.
    #[must_use]
    pub fn shown_as(
        config: ClientConfig,
        parts: PageParts,
        queue_id: QueueId,
        otp: Otp,
        status: TicketStatus,
    ) -> Self {
        Self::build(config, parts, queue_id, otp, Some(status))
    }

    fn build(
        config: ClientConfig,
        parts: PageParts,
        queue_id: QueueId,
        otp: Otp,
        shown: Option<TicketStatus>,
    ) -> Self {
        let tickets = parts.tickets(&config);
        let cached = tickets.load(&queue_id);

        let (channel, events) = match parts.connector {
            Some(connector) => {
                let (channel, events) =
                    RealtimeChannel::new(connector, config.connect_timeout, config.channel_capacity);
                (Some(channel), Some(events))
            },
            None => (None, None),
        };

        let env = StatusEnvironment::new(
            tickets,
            Preferences::new(parts.storage),
            StatusPoller::new(parts.api, config.poll_timeout),
            channel,
            parts.presenter,
            parts.clock,
            config,
        );

        let mut state = StatusState::new(queue_id, otp, cached);
        if let Some(status) = shown {
            state = state.with_rendered_status(status);
        }

        Self {
            store: Store::new(state, StatusReducer::new(), env),
            events,
            forwarder: None,
        }
    }

    /// Start polling and listening
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the page was already stopped.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if let Some(events) = self.events.take() {
            self.forwarder = Some(tokio::spawn(forward_channel_events(self.store.clone(), events)));
        }
        self.store.send(StatusAction::Start).await?;
        Ok(())
    }

    /// Check the server right away
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the page was stopped.
    pub async fn check_now(&self) -> Result<(), ClientError> {
        Ok(self.store.send(StatusAction::CheckNow).await?)
    }

    /// Flip the turn sound preference
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the page was stopped.
    pub async fn toggle_sound(&self) -> Result<(), ClientError> {
        Ok(self.store.send(StatusAction::ToggleSound).await?)
    }

    /// Flip the colour theme
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the page was stopped.
    pub async fn toggle_theme(&self) -> Result<(), ClientError> {
        Ok(self.store.send(StatusAction::ToggleTheme).await?)
    }

    /// Forget every cached ticket and go back to the join page
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the page was stopped.
    pub async fn join_new_queue(&self) -> Result<(), ClientError> {
        Ok(self.store.send(StatusAction::JoinNewQueue).await?)
    }

    /// Current page state
    pub async fn state(&self) -> StatusState {
        self.store.state(Clone::clone).await
    }

    /// Actions produced by effects, for observers
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusAction> {
        self.store.subscribe_actions()
    }

    /// Leave the page, cancelling timers, checks, and the channel
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if outstanding work did not finish in time.
    pub async fn stop(&mut self) -> Result<(), ClientError> {
        if let Err(error) = self.store.send(StatusAction::Stop).await {
            tracing::debug!(error = %error, "Status page already stopping");
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.store.shutdown_default().await?;
        Ok(())
    }
}

impl std::fmt::Debug for StatusPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPage")
            .field("environment", self.store.environment())
            .finish_non_exhaustive()
    }
}

async fn forward_channel_events(store: StatusStore, mut events: mpsc::Receiver<ChannelEvent>) {
    while let Some(event) = events.recv().await {
        if let Err(error) = store.send(StatusAction::from(event)).await {
            tracing::debug!(error = %error, "Status page gone, stopping channel forwarding");
            break;
        }
    }
}

/// Join page for one queue
pub struct JoinPage {
    store: JoinStore,
    join_timeout: Duration,
}

impl JoinPage {
    /// Production page for `queue_id`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the storage file cannot be read.
    pub fn open(
        config: &ClientConfig,
        queue_id: QueueId,
        presenter: Arc<dyn PresentationAdapter>,
    ) -> Result<Self, ClientError> {
        let parts = PageParts::production(config, presenter)?;
        Ok(Self::new(config, parts, queue_id))
    }

    /// Page over injected collaborators; the push channel is not used here
    #[must_use]
    pub fn new(config: &ClientConfig, parts: PageParts, queue_id: QueueId) -> Self {
        let env = JoinEnvironment::new(
            parts.tickets(config),
            parts.api,
            parts.presenter,
            config.join_timeout,
        );

        Self {
            store: Store::new(JoinState::new(queue_id), JoinReducer::new(), env),
            join_timeout: config.join_timeout,
        }
    }

    /// Show and verify the cached ticket, if any
    ///
    /// Resolves once verification finished; returns the ticket still valid afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the page was shut down.
    pub async fn rehydrate(&self) -> Result<Option<Ticket>, ClientError> {
        let mut verifying = self.store.environment().verification();
        self.store.send(JoinAction::Rehydrate).await?;

        match tokio::time::timeout(self.join_timeout, verifying.wait_for(|pending| !*pending)).await {
            Ok(Ok(_)) => {},
            Ok(Err(_)) => tracing::debug!("Verification signal dropped"),
            Err(_) => tracing::debug!("Verification still pending, showing cached ticket"),
        }

        Ok(self.store.state(|s| s.ticket.clone()).await)
    }

    /// Join the queue
    ///
    /// Returns the new ticket's otp, or `None` when the join failed; the
    /// failure has already been shown through the presenter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the page was shut down or the join never completed.
    pub async fn join(&self) -> Result<Option<Otp>, ClientError> {
        let completed = self
            .store
            .send_and_wait_for(
                JoinAction::JoinRequested,
                |action| matches!(action, JoinAction::JoinCompleted(_)),
                self.join_timeout + Duration::from_secs(1),
            )
            .await?;

        Ok(match completed {
            JoinAction::JoinCompleted(Ok(ticket)) => Some(ticket.otp),
            _ => None,
        })
    }

    /// Current page state
    pub async fn state(&self) -> JoinState {
        self.store.state(Clone::clone).await
    }

    /// Wait for outstanding presentation work
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if outstanding work did not finish in time.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.store.shutdown_default().await?;
        Ok(())
    }
}

impl std::fmt::Debug for JoinPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinPage")
            .field("join_timeout", &self.join_timeout)
            .finish_non_exhaustive()
    }
}

/// Remove every cached ticket from the configured storage
///
/// Preferences are kept. Returns the number of tickets removed.
///
/// # Errors
///
/// Returns [`ClientError::Storage`] if the storage file cannot be read.
pub fn forget_all(config: &ClientConfig) -> Result<usize, ClientError> {
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.storage_path)?);
    let tickets = TicketStore::new(storage, Arc::new(SystemClock), config.staleness_threshold());
    Ok(tickets.clear_all())
}
