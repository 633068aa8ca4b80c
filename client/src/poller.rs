//! Status checks with supersession.
//!
//! A poller owns at most one in-flight check. Starting a check aborts the
//! previous one, and the aborted check reports [`CheckOutcome::Superseded`]
//! instead of whatever the server eventually answers.

use crate::api::QueueApi;
use crate::error::ApiError;
use crate::ticket::{Otp, Snapshot};
use futures::future::{AbortHandle, Abortable};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Identifies one status check; issued in increasing order by the page state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The id after this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a status check ended
#[derive(Clone, Debug, PartialEq)]
pub enum CheckOutcome {
    /// Server answered with a snapshot
    Snapshot(Snapshot),
    /// Server no longer knows the ticket
    NotFound,
    /// The optional poll bound elapsed
    TimedOut,
    /// Transient failure; retry on the next tick
    Failed(ApiError),
    /// A newer check replaced this one; the result must not be applied
    Superseded,
}

impl From<Result<Snapshot, ApiError>> for CheckOutcome {
    fn from(result: Result<Snapshot, ApiError>) -> Self {
        match result {
            Ok(snapshot) => Self::Snapshot(snapshot),
            Err(ApiError::NotFound(_)) => Self::NotFound,
            Err(ApiError::Timeout) => Self::TimedOut,
            Err(ApiError::Aborted) => Self::Superseded,
            Err(error) => Self::Failed(error),
        }
    }
}

struct InFlight {
    request_id: RequestId,
    handle: AbortHandle,
}

/// Issues status checks, keeping at most one in flight
#[derive(Clone)]
pub struct StatusPoller {
    api: Arc<dyn QueueApi>,
    poll_timeout: Option<Duration>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl StatusPoller {
    /// Poller over `api`; `poll_timeout` bounds each check when set
    #[must_use]
    pub fn new(api: Arc<dyn QueueApi>, poll_timeout: Option<Duration>) -> Self {
        Self {
            api,
            poll_timeout,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Fetch the current status of `otp`, superseding any check in flight
    #[tracing::instrument(skip_all, fields(otp = %otp, request_id = %request_id))]
    pub async fn check_status(&self, request_id: RequestId, otp: &Otp) -> CheckOutcome {
        let (handle, registration) = AbortHandle::new_pair();

        if let Some(previous) = self.swap(Some(InFlight { request_id, handle })) {
            tracing::debug!(superseded = %previous.request_id, "Aborting older status check");
            previous.handle.abort();
        }

        let api = Arc::clone(&self.api);
        let poll_timeout = self.poll_timeout;
        let request = async move {
            match poll_timeout {
                Some(bound) => tokio::time::timeout(bound, api.check_status(otp))
                    .await
                    .unwrap_or(Err(ApiError::Timeout)),
                None => api.check_status(otp).await,
            }
        };

        let outcome = match Abortable::new(request, registration).await {
            Ok(result) => CheckOutcome::from(result),
            Err(_aborted) => CheckOutcome::Superseded,
        };

        if !self.finish(request_id) {
            // Replaced after the response arrived but before we got here
            return CheckOutcome::Superseded;
        }

        match &outcome {
            CheckOutcome::Snapshot(snapshot) => {
                tracing::debug!(status = %snapshot.status, position = snapshot.position, "Status received");
            },
            CheckOutcome::Failed(error) => tracing::warn!(error = %error, "Status check failed"),
            CheckOutcome::TimedOut => tracing::debug!("Status check timed out"),
            CheckOutcome::NotFound | CheckOutcome::Superseded => {},
        }

        outcome
    }

    /// Abort the check in flight, if any
    pub fn cancel(&self) {
        if let Some(in_flight) = self.swap(None) {
            in_flight.handle.abort();
        }
    }

    /// Whether a check is currently in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.with_in_flight(|slot| slot.is_some())
    }

    fn swap(&self, next: Option<InFlight>) -> Option<InFlight> {
        self.with_in_flight(|slot| std::mem::replace(slot, next))
    }

    /// Clear the slot if it still belongs to `request_id`
    fn finish(&self, request_id: RequestId) -> bool {
        self.with_in_flight(|slot| {
            if slot.as_ref().is_some_and(|f| f.request_id == request_id) {
                *slot = None;
                true
            } else {
                false
            }
        })
    }

    fn with_in_flight<T>(&self, f: impl FnOnce(&mut Option<InFlight>) -> T) -> T {
        match self.in_flight.lock() {
            Ok(mut slot) => f(&mut slot),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusPoller")
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}
