//! Actions for the status page.

use crate::channel::{ChannelEvent, PushEvent};
use crate::poller::{CheckOutcome, RequestId};

/// What caused a status check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckTrigger {
    /// First check after the page starts
    Initial,
    /// Poll interval elapsed
    Timer,
    /// User asked for it
    Manual,
    /// A push event asked for it
    Push,
    /// The push channel came back after a drop
    Reconnect,
    /// The view was refreshed
    Reload,
}

/// Inputs to the status page reducer
///
/// User intents, timer ticks, check results, and push channel events all
/// arrive here; nothing else mutates the page state.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusAction {
    /// Page opened: schedule the first check, start polling, connect the channel
    Start,

    /// Poll interval elapsed
    PollTick,

    /// Manual "check now"
    CheckNow,

    /// Run a check for the given reason
    CheckRequested {
        /// Why
        trigger: CheckTrigger,
    },

    /// A status check finished
    StatusReceived {
        /// Id the check was issued under
        request_id: RequestId,
        /// Result
        outcome: CheckOutcome,
    },

    /// Push event from the server
    Push(PushEvent),

    /// Push channel connected and subscribed
    ChannelConnected,

    /// Push channel dropped
    ChannelDisconnected {
        /// Why
        reason: String,
    },

    /// Push channel could not be opened
    ChannelFailed {
        /// Why
        message: String,
    },

    /// Backoff elapsed; try the channel again
    ReconnectDue,

    /// Re-render from the cached ticket and check again
    RefreshView,

    /// Flip the turn sound preference
    ToggleSound,

    /// Flip the colour theme
    ToggleTheme,

    /// Forget every ticket and go back to the join page
    JoinNewQueue,

    /// Leave the page: cancel timers and in-flight work
    Stop,
}

impl From<ChannelEvent> for StatusAction {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Connected => Self::ChannelConnected,
            ChannelEvent::Disconnected { reason } => Self::ChannelDisconnected { reason },
            ChannelEvent::Push(push) => Self::Push(push),
        }
    }
}
