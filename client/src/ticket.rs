//! Ticket model and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque ticket code assigned by the server on join
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Otp(String);

impl Otp {
    /// Wrap a ticket code
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The raw code
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Otp {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Queue identifier (the company code a customer joins through)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    /// Wrap a queue identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Server-reported ticket status
///
/// Unrecognized values are kept verbatim and written back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketStatus {
    /// In line
    #[default]
    Waiting,
    /// At the counter
    Serving,
    /// Done
    Served,
    /// Removed by staff
    Removed,
    /// Anything else the server sends
    Other(String),
}

impl TicketStatus {
    /// `served` and `removed` end the ticket's lifecycle
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Served | Self::Removed)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "waiting",
            Self::Serving => "serving",
            Self::Served => "served",
            Self::Removed => "removed",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for TicketStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "waiting" => Self::Waiting,
            "serving" => Self::Serving,
            "served" => Self::Served,
            "removed" => Self::Removed,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for TicketStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<TicketStatus> for String {
    fn from(status: TicketStatus) -> Self {
        match status {
            TicketStatus::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer's queue membership as cached on the device
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket code
    pub otp: Otp,
    /// Serving station, absent before assignment
    pub cashier_number: Option<u32>,
    /// Queue position, 0 while being served
    pub position: u32,
    /// Last server-reported status
    pub status: TicketStatus,
    /// Server estimate, never computed locally
    #[serde(deserialize_with = "seconds::deserialize")]
    pub estimated_wait_seconds: u64,
    /// When this record was last reconciled; absent on legacy records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Ticket seeded from a snapshot, for a record not seen before
    #[must_use]
    pub fn from_snapshot(otp: Otp, snapshot: &Snapshot) -> Self {
        Self {
            otp,
            cashier_number: snapshot.cashier_number,
            position: snapshot.position,
            status: snapshot.status.clone(),
            estimated_wait_seconds: snapshot.estimated_wait_seconds,
            last_update: None,
        }
    }

    /// Fold a snapshot's server-owned fields into this ticket
    ///
    /// `last_update` is left to the caller, which stamps it on write.
    pub fn merge(&mut self, snapshot: &Snapshot) {
        self.position = snapshot.position;
        self.status = snapshot.status.clone();
        self.estimated_wait_seconds = snapshot.estimated_wait_seconds;
        if snapshot.cashier_number.is_some() {
            self.cashier_number = snapshot.cashier_number;
        }
    }

    /// Display values derived from this ticket
    #[must_use]
    pub fn view(&self) -> TicketView {
        TicketView::from(self)
    }
}

/// Point-in-time status from the status endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Queue position
    pub position: u32,
    /// Status
    #[serde(default)]
    pub status: TicketStatus,
    /// Server estimate
    #[serde(default, deserialize_with = "seconds::deserialize")]
    pub estimated_wait_seconds: u64,
    /// Serving station
    #[serde(default)]
    pub cashier_number: Option<u32>,
    /// `false` when the assigned station is closed
    #[serde(default)]
    pub cashier_is_active: Option<bool>,
    /// Queue the ticket belongs to
    #[serde(default)]
    pub company_code: Option<String>,
    /// Seconds since serving started
    #[serde(default)]
    pub serving_time_passed: Option<f64>,
    /// Times this ticket was pushed back
    #[serde(default)]
    pub delays: Option<u32>,
}

impl Snapshot {
    /// Snapshot with only the always-present fields set
    #[must_use]
    pub const fn new(position: u32, status: TicketStatus, estimated_wait_seconds: u64) -> Self {
        Self {
            position,
            status,
            estimated_wait_seconds,
            cashier_number: None,
            cashier_is_active: None,
            company_code: None,
            serving_time_passed: None,
            delays: None,
        }
    }

    /// Set the serving station
    #[must_use]
    pub const fn with_cashier(mut self, cashier_number: u32) -> Self {
        self.cashier_number = Some(cashier_number);
        self
    }
}

/// Whole seconds that the server may send as a float or `null`
pub(crate) mod seconds {
    use serde::{Deserialize, Deserializer};

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
        if value.is_finite() && value > 0.0 {
            Ok(value.round() as u64)
        } else {
            Ok(0)
        }
    }
}

/// Values ready for rendering
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketView {
    /// Ticket code
    pub otp: Otp,
    /// Serving station
    pub cashier_number: Option<u32>,
    /// Queue position
    pub position: u32,
    /// Status
    pub status: TicketStatus,
    /// Wait estimate rounded to whole minutes
    pub wait_minutes: u64,
}

impl From<&Ticket> for TicketView {
    fn from(ticket: &Ticket) -> Self {
        Self {
            otp: ticket.otp.clone(),
            cashier_number: ticket.cashier_number,
            position: ticket.position,
            status: ticket.status.clone(),
            wait_minutes: wait_minutes(ticket.estimated_wait_seconds),
        }
    }
}

/// Seconds to whole minutes, half rounding up
#[must_use]
pub const fn wait_minutes(seconds: u64) -> u64 {
    seconds.saturating_add(30) / 60
}
