//! Dependencies of the status page reducer.

use crate::channel::RealtimeChannel;
use crate::config::ClientConfig;
use crate::poller::StatusPoller;
use crate::preferences::Preferences;
use crate::presentation::PresentationAdapter;
use crate::ticket_store::TicketStore;
use std::sync::Arc;
use walkin_core::environment::Clock;
use walkin_runtime::BackoffPolicy;

/// Everything the status reducer talks to
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct StatusEnvironment {
    tickets: Arc<TicketStore>,
    preferences: Preferences,
    poller: StatusPoller,
    channel: Option<RealtimeChannel>,
    presenter: Arc<dyn PresentationAdapter>,
    clock: Arc<dyn Clock>,
    reconnect: BackoffPolicy,
    config: ClientConfig,
}

impl StatusEnvironment {
    /// Assemble an environment; without a channel the page relies on polling alone
    #[must_use]
    pub fn new(
        tickets: Arc<TicketStore>,
        preferences: Preferences,
        poller: StatusPoller,
        channel: Option<RealtimeChannel>,
        presenter: Arc<dyn PresentationAdapter>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        Self {
            tickets,
            preferences,
            poller,
            channel,
            presenter,
            clock,
            reconnect: config.reconnect_policy(),
            config,
        }
    }

    /// Ticket cache
    #[must_use]
    pub fn tickets(&self) -> &TicketStore {
        &self.tickets
    }

    /// Persisted preferences
    #[must_use]
    pub const fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Status checks
    #[must_use]
    pub const fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    /// Push channel, if the page has one
    #[must_use]
    pub const fn channel(&self) -> Option<&RealtimeChannel> {
        self.channel.as_ref()
    }

    /// Presentation adapter
    #[must_use]
    pub const fn presenter(&self) -> &Arc<dyn PresentationAdapter> {
        &self.presenter
    }

    /// Time source
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Reconnect schedule
    #[must_use]
    pub const fn reconnect_policy(&self) -> &BackoffPolicy {
        &self.reconnect
    }

    /// Intervals and thresholds
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for StatusEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusEnvironment")
            .field("channel", &self.channel)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
