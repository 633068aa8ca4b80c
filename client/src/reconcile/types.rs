//! Status page state.

use crate::poller::RequestId;
use crate::preferences::Theme;
use crate::presentation::Notification;
use crate::ticket::{Otp, QueueId, Ticket, TicketStatus};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Where the page is in its life
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Created, `Start` not yet seen
    #[default]
    Idle,
    /// Polling and listening
    Active,
    /// Ticket reached a terminal status; a pending refresh may still run
    Finished,
    /// Left the page; nothing else happens
    Stopped,
}

/// Push channel connectivity as the page sees it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Connection {
    /// Not connected
    #[default]
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Connected and subscribed
    Connected,
}

/// State of one status page
#[derive(Clone, Debug)]
pub struct StatusState {
    /// Queue the ticket belongs to
    pub queue_id: QueueId,
    /// Ticket shown on this page
    pub otp: Otp,
    /// Last accepted ticket
    pub ticket: Option<Ticket>,
    /// Status the view was last rendered with
    pub rendered_status: Option<TicketStatus>,
    /// Check whose result will be applied; older results are dropped
    pub current_request: Option<RequestId>,
    /// Last id handed out
    pub last_request: RequestId,
    /// When a snapshot was last accepted
    pub last_accepted_at: Option<DateTime<Utc>>,
    /// Whether the assigned cashier was active in the last snapshot
    pub cashier_active: Option<bool>,
    /// A status-change refresh is pending
    pub refresh_scheduled: bool,
    /// Lifecycle
    pub phase: Phase,
    /// Push channel connectivity
    pub connection: Connection,
    /// Reconnects since the last successful connect
    pub reconnect_attempts: u32,
    /// A reconnect is waiting on its backoff
    pub reconnect_pending: bool,
    /// Turn sound preference
    pub sound_enabled: bool,
    /// Colour theme
    pub theme: Theme,
    /// Recent notifications, newest first
    pub notifications: VecDeque<Notification>,
}

impl StatusState {
    /// Page for `otp`, optionally seeded with the cached ticket
    ///
    /// A cached ticket for a different otp is ignored.
    #[must_use]
    pub fn new(queue_id: QueueId, otp: Otp, cached: Option<Ticket>) -> Self {
        let ticket = cached.filter(|ticket| ticket.otp == otp);
        let rendered_status = ticket.as_ref().map(|ticket| ticket.status.clone());

        Self {
            queue_id,
            otp,
            ticket,
            rendered_status,
            current_request: None,
            last_request: RequestId::default(),
            last_accepted_at: None,
            cashier_active: None,
            refresh_scheduled: false,
            phase: Phase::Idle,
            connection: Connection::Disconnected,
            reconnect_attempts: 0,
            reconnect_pending: false,
            sound_enabled: true,
            theme: Theme::default(),
            notifications: VecDeque::new(),
        }
    }

    /// Override the status the page was first shown with
    ///
    /// A page reopened on a ticket that was already served has no cached
    /// ticket to seed from, but still celebrates on start.
    #[must_use]
    pub fn with_rendered_status(mut self, status: TicketStatus) -> Self {
        self.rendered_status = Some(status);
        self
    }

    /// Whether the page still polls and listens
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    /// Hand out the next request id and make it current
    pub fn next_request(&mut self) -> RequestId {
        self.last_request = self.last_request.next();
        self.current_request = Some(self.last_request);
        self.last_request
    }

    /// Record a notification, keeping at most `capacity`
    pub fn push_notification(&mut self, notification: Notification, capacity: usize) {
        self.notifications.push_front(notification);
        self.notifications.truncate(capacity);
    }
}
