//! Presentation extension points.
//!
//! Reducers never render anything themselves. They describe presentation
//! calls as effects, and the page's [`PresentationAdapter`] performs them:
//! a terminal UI, a browser bridge, or a recorder in tests.

use crate::preferences::Theme;
use crate::ticket::{Otp, QueueId, TicketStatus, TicketView};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use walkin_core::effect::Effect;

/// Severity of a user-facing message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Status information
    Info,
    /// Something needs the user's attention
    Warning,
    /// Something went wrong
    Error,
}

/// A user-facing message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Severity
    pub level: NotificationLevel,
    /// Text
    pub message: String,
}

impl Notification {
    /// Informational message
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// Warning
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    /// Error
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Where the page should go next
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// Status page for a ticket
    StatusView {
        /// Ticket
        otp: Otp,
    },
    /// Join page for a queue
    JoinView {
        /// Queue
        queue_id: QueueId,
    },
    /// Re-render the current page from fresh data
    Reload,
}

/// Presentation collaborator
///
/// Every method has a no-op default so adapters implement only what they show.
pub trait PresentationAdapter: Send + Sync {
    /// A snapshot was accepted and merged; render the ticket
    fn on_accept(&self, _view: &TicketView) {}

    /// The ticket reached `served` or `removed`
    fn on_terminal(&self, _status: &TicketStatus) {}

    /// It is this ticket's turn; play the turn sound when `sound_enabled`
    fn on_turn(&self, _cashier_number: Option<u32>, _sound_enabled: bool) {}

    /// Show a message; `history` is the most recent messages, newest first
    fn notify(&self, _notification: &Notification, _history: &[Notification]) {}

    /// Change page
    fn navigate(&self, _to: &Navigation) {}

    /// Show a cached ticket on the join page
    fn show_ticket(&self, _view: &TicketView) {}

    /// Revert the join page to its pre-join state
    fn show_join_form(&self, _queue_id: &QueueId) {}

    /// Enable or disable the join action
    fn set_joining(&self, _joining: bool) {}

    /// Sound preference changed
    fn on_sound_changed(&self, _enabled: bool) {}

    /// Theme changed
    fn on_theme_changed(&self, _theme: Theme) {}

    /// Push channel connectivity changed
    fn on_connection_changed(&self, _connected: bool) {}
}

/// One deferred call on a [`PresentationAdapter`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresentationCall {
    /// `on_accept`
    Accept(TicketView),
    /// `on_terminal`
    Terminal(TicketStatus),
    /// `on_turn`
    Turn {
        /// Station
        cashier_number: Option<u32>,
        /// Sound flag
        sound_enabled: bool,
    },
    /// `notify` with the history at the time of the call
    Notify(Notification, Vec<Notification>),
    /// `navigate`
    Navigate(Navigation),
    /// `show_ticket`
    ShowTicket(TicketView),
    /// `show_join_form`
    ShowJoinForm(QueueId),
    /// `set_joining`
    Joining(bool),
    /// `on_sound_changed`
    Sound(bool),
    /// `on_theme_changed`
    Theme(Theme),
    /// `on_connection_changed`
    Connection(bool),
}

impl PresentationCall {
    /// Perform this call
    pub fn apply(&self, presenter: &dyn PresentationAdapter) {
        match self {
            Self::Accept(view) => presenter.on_accept(view),
            Self::Terminal(status) => presenter.on_terminal(status),
            Self::Turn {
                cashier_number,
                sound_enabled,
            } => presenter.on_turn(*cashier_number, *sound_enabled),
            Self::Notify(notification, history) => presenter.notify(notification, history),
            Self::Navigate(to) => presenter.navigate(to),
            Self::ShowTicket(view) => presenter.show_ticket(view),
            Self::ShowJoinForm(queue_id) => presenter.show_join_form(queue_id),
            Self::Joining(joining) => presenter.set_joining(*joining),
            Self::Sound(enabled) => presenter.on_sound_changed(*enabled),
            Self::Theme(theme) => presenter.on_theme_changed(*theme),
            Self::Connection(connected) => presenter.on_connection_changed(*connected),
        }
    }
}

/// Effect that performs `calls` in order
pub fn present<A>(presenter: &Arc<dyn PresentationAdapter>, calls: Vec<PresentationCall>) -> Effect<A>
where
    A: Send + 'static,
{
    let presenter = Arc::clone(presenter);
    Effect::future(async move {
        for call in &calls {
            call.apply(presenter.as_ref());
        }
        None
    })
}

/// Effect that performs `calls` in order after `delay`
pub fn present_after<A>(
    presenter: &Arc<dyn PresentationAdapter>,
    delay: Duration,
    calls: Vec<PresentationCall>,
) -> Effect<A>
where
    A: Send + 'static,
{
    let presenter = Arc::clone(presenter);
    Effect::future(async move {
        tokio::time::sleep(delay).await;
        for call in &calls {
            call.apply(presenter.as_ref());
        }
        None
    })
}

/// Writes to stdout and logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePresenter;

impl PresentationAdapter for ConsolePresenter {
    fn on_accept(&self, view: &TicketView) {
        tracing::info!(otp = %view.otp, position = view.position, status = %view.status, "Rendered");
        let cashier = view
            .cashier_number
            .map_or_else(|| "-".to_string(), |n| format!("#{n}"));
        println!(
            "[{}] position {} | cashier {} | ~{} minutes | {}",
            view.otp, view.position, cashier, view.wait_minutes, view.status
        );
    }

    fn on_terminal(&self, status: &TicketStatus) {
        match status {
            TicketStatus::Served => println!("*** You have been served. Thank you! ***"),
            other => println!("Your ticket is no longer active ({other})."),
        }
    }

    fn on_turn(&self, cashier_number: Option<u32>, sound_enabled: bool) {
        if sound_enabled {
            print!("\x07");
        }
        match cashier_number {
            Some(n) => println!(">>> It's your turn! Please go to cashier #{n}"),
            None => println!(">>> It's your turn!"),
        }
    }

    fn notify(&self, notification: &Notification, _history: &[Notification]) {
        match notification.level {
            NotificationLevel::Info => println!("  {notification}"),
            NotificationLevel::Warning => println!("  ! {notification}"),
            NotificationLevel::Error => eprintln!("  x {notification}"),
        }
    }

    fn navigate(&self, to: &Navigation) {
        tracing::info!(?to, "Navigate");
    }

    fn show_ticket(&self, view: &TicketView) {
        println!(
            "Existing ticket {} at position {} (~{} minutes)",
            view.otp, view.position, view.wait_minutes
        );
    }

    fn show_join_form(&self, queue_id: &QueueId) {
        println!("No active ticket for {queue_id}.");
    }

    fn on_sound_changed(&self, enabled: bool) {
        println!("Sound {}", if enabled { "on" } else { "off" });
    }

    fn on_theme_changed(&self, theme: Theme) {
        println!("Theme: {theme}");
    }

    fn on_connection_changed(&self, connected: bool) {
        tracing::debug!(connected, "Push channel connectivity");
    }
}

/// Records every presentation call, for assertions
#[cfg(any(test, feature = "test-utils"))]
pub mod recording {
    use super::{Navigation, Notification, PresentationAdapter, QueueId, Theme, TicketStatus, TicketView};
    use std::sync::Mutex;

    /// One recorded call
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Call {
        /// `on_accept`
        Accept(TicketView),
        /// `on_terminal`
        Terminal(TicketStatus),
        /// `on_turn`
        Turn {
            /// Station
            cashier_number: Option<u32>,
            /// Sound flag
            sound_enabled: bool,
        },
        /// `notify`
        Notify(Notification),
        /// `navigate`
        Navigate(Navigation),
        /// `show_ticket`
        ShowTicket(TicketView),
        /// `show_join_form`
        ShowJoinForm(QueueId),
        /// `set_joining`
        Joining(bool),
        /// `on_sound_changed`
        Sound(bool),
        /// `on_theme_changed`
        Theme(Theme),
        /// `on_connection_changed`
        Connection(bool),
    }

    /// Presentation adapter that remembers what it was asked to do
    #[derive(Debug, Default)]
    pub struct RecordingPresenter {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingPresenter {
        /// Nothing recorded yet
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call so far, in order
        #[must_use]
        pub fn calls(&self) -> Vec<Call> {
            match self.calls.lock() {
                Ok(calls) => calls.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }

        /// Messages passed to `notify`, in order
        #[must_use]
        pub fn messages(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Notify(n) => Some(n.message),
                    _ => None,
                })
                .collect()
        }

        /// Targets passed to `navigate`, in order
        #[must_use]
        pub fn navigations(&self) -> Vec<Navigation> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Navigate(to) => Some(to),
                    _ => None,
                })
                .collect()
        }

        /// Forget everything recorded so far
        pub fn clear(&self) {
            match self.calls.lock() {
                Ok(mut calls) => calls.clear(),
                Err(poisoned) => poisoned.into_inner().clear(),
            }
        }

        fn record(&self, call: Call) {
            match self.calls.lock() {
                Ok(mut calls) => calls.push(call),
                Err(poisoned) => poisoned.into_inner().push(call),
            }
        }
    }

    impl PresentationAdapter for RecordingPresenter {
        fn on_accept(&self, view: &TicketView) {
            self.record(Call::Accept(view.clone()));
        }

        fn on_terminal(&self, status: &TicketStatus) {
            self.record(Call::Terminal(status.clone()));
        }

        fn on_turn(&self, cashier_number: Option<u32>, sound_enabled: bool) {
            self.record(Call::Turn {
                cashier_number,
                sound_enabled,
            });
        }

        fn notify(&self, notification: &Notification, _history: &[Notification]) {
            self.record(Call::Notify(notification.clone()));
        }

        fn navigate(&self, to: &Navigation) {
            self.record(Call::Navigate(to.clone()));
        }

        fn show_ticket(&self, view: &TicketView) {
            self.record(Call::ShowTicket(view.clone()));
        }

        fn show_join_form(&self, queue_id: &QueueId) {
            self.record(Call::ShowJoinForm(queue_id.clone()));
        }

        fn set_joining(&self, joining: bool) {
            self.record(Call::Joining(joining));
        }

        fn on_sound_changed(&self, enabled: bool) {
            self.record(Call::Sound(enabled));
        }

        fn on_theme_changed(&self, theme: Theme) {
            self.record(Call::Theme(theme));
        }

        fn on_connection_changed(&self, connected: bool) {
            self.record(Call::Connection(connected));
        }
    }
}
