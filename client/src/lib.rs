//! # Walkin Client
//!
//! Client side of a walk-in queue: join a queue, keep a ticket up to date,
//! and tell the customer when it is their turn.
//!
//! Two sources feed the status page. A [`poller::StatusPoller`] asks the
//! server for the ticket on a timer, and a [`channel::RealtimeChannel`]
//! delivers push events as they happen. [`reconcile::StatusReducer`] merges
//! both into one consistent view:
//!
//! - only the newest status request may change state
//! - the ticket cache is written before anything is rendered
//! - a status change reloads the page exactly once
//! - push disconnects reconnect with bounded exponential backoff
//!
//! ## Example
//!
//! ```ignore
//! use walkin_client::{ClientConfig, ConsolePresenter, StatusPage};
//!
//! let config = ClientConfig::from_env()?;
//! let mut page = StatusPage::open(&config, queue_id, otp, Arc::new(ConsolePresenter))?;
//! page.start().await?;
//! ```

pub mod api;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod join;
pub mod poller;
pub mod preferences;
pub mod presentation;
pub mod reconcile;
pub mod storage;
pub mod ticket;
pub mod ticket_store;

pub use config::ClientConfig;
pub use controller::{JoinPage, PageParts, StatusPage, forget_all};
pub use error::{ApiError, ChannelError, ClientError, ConfigError, StorageError};
pub use presentation::{ConsolePresenter, Navigation, Notification, PresentationAdapter};
pub use ticket::{Otp, QueueId, Snapshot, Ticket, TicketStatus, TicketView};
