//! Wire frames and the events they carry.

use crate::ticket::Otp;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Push notification from the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushEvent {
    /// A ticket is now being served
    Turn {
        /// Ticket called
        otp: Otp,
        /// Station to go to
        cashier_number: Option<u32>,
    },
    /// A ticket was removed from the queue
    Removed {
        /// Ticket removed
        otp: Otp,
    },
    /// A ticket was pushed back
    Delayed {
        /// Ticket delayed
        otp: Otp,
    },
    /// Something in the queue changed
    QueueUpdated,
}

impl PushEvent {
    /// The ticket this event targets, if it targets one
    #[must_use]
    pub const fn otp(&self) -> Option<&Otp> {
        match self {
            Self::Turn { otp, .. } | Self::Removed { otp } | Self::Delayed { otp } => Some(otp),
            Self::QueueUpdated => None,
        }
    }
}

/// What the channel reports to its owner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connected and subscribed
    Connected,
    /// Connection lost
    Disconnected {
        /// Why
        reason: String,
    },
    /// A push arrived
    Push(PushEvent),
}

/// `{"event": <name>, "data": {...}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct Frame {
    /// Event name
    pub event: String,
    /// Payload
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Deserialize)]
struct TicketPayload {
    otp: Otp,
    #[serde(default)]
    cashier_number: Option<u32>,
}

impl Frame {
    /// Subscribe to events for one ticket
    #[must_use]
    pub fn join_customer_room(otp: &Otp) -> Self {
        Self {
            event: "join_customer_room".to_string(),
            data: json!({ "otp": otp }),
        }
    }

    /// Subscribe to events for one queue
    #[must_use]
    pub fn join_company_room(company_code: &str) -> Self {
        Self {
            event: "join_company_room".to_string(),
            data: json!({ "company_code": company_code }),
        }
    }

    /// Decode the push event this frame carries
    ///
    /// Unknown event names and payloads missing an `otp` yield `None`.
    #[must_use]
    pub fn into_push(self) -> Option<PushEvent> {
        let ticket = |data: serde_json::Value| serde_json::from_value::<TicketPayload>(data).ok();

        match self.event.as_str() {
            "customer_turn" => ticket(self.data).map(|p| PushEvent::Turn {
                otp: p.otp,
                cashier_number: p.cashier_number,
            }),
            "customer_removed" => ticket(self.data).map(|p| PushEvent::Removed { otp: p.otp }),
            "customer_delayed" => ticket(self.data).map(|p| PushEvent::Delayed { otp: p.otp }),
            "queue_updated" => Some(PushEvent::QueueUpdated),
            _ => None,
        }
    }
}
