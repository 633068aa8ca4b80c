//! Status page reconciliation.
//!
//! The status page keeps a cached ticket in step with the server. Three
//! sources feed it: a poll timer, push events from the realtime channel, and
//! user intents. All of them become [`StatusAction`]s and go through
//! [`StatusReducer`], which decides what to accept and describes the work to
//! do next as effects.
//!
//! # Rules
//!
//! - Only the result of the current check is applied; a newer check cancels
//!   the older one and any late result is dropped.
//! - `NotFound` is authoritative: the ticket is evicted and the page goes
//!   back to the join view.
//! - `served` and `removed` evict the cached ticket and end polling.
//! - A status different from the one the view was rendered with schedules a
//!   single refresh.
//! - `queue_updated` pushes are debounced against the last accepted snapshot;
//!   timer checks never are.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod types;

pub use actions::{CheckTrigger, StatusAction};
pub use environment::StatusEnvironment;
pub use reducer::StatusReducer;
pub use types::{Connection, Phase, StatusState};
