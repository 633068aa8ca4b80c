//! Join page.
//!
//! On load the page shows any cached ticket for the queue and verifies it
//! with the server; a ticket the server no longer knows, or one that already
//! reached a terminal status, is evicted and the join form comes back.
//! Joining is single-flight: a second request while one is pending is
//! ignored.

use crate::api::QueueApi;
use crate::error::ApiError;
use crate::poller::CheckOutcome;
use crate::presentation::{Navigation, Notification, PresentationAdapter, PresentationCall, present};
use crate::ticket::{Otp, QueueId, Ticket};
use crate::ticket_store::TicketStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use walkin_core::effect::Effect;
use walkin_core::reducer::Reducer;
use walkin_core::{SmallVec, smallvec};

/// Join page state
#[derive(Clone, Debug, PartialEq)]
pub struct JoinState {
    /// Queue this page joins
    pub queue_id: QueueId,
    /// Cached ticket being shown, if any
    pub ticket: Option<Ticket>,
    /// A join request is in flight
    pub joining: bool,
    /// The cached ticket is being verified
    pub verifying: bool,
    /// Last error shown to the user
    pub last_error: Option<String>,
}

impl JoinState {
    /// Fresh page for `queue_id`
    #[must_use]
    pub const fn new(queue_id: QueueId) -> Self {
        Self {
            queue_id,
            ticket: None,
            joining: false,
            verifying: false,
            last_error: None,
        }
    }
}

/// Join page inputs
#[derive(Clone, Debug, PartialEq)]
pub enum JoinAction {
    /// Page opened: show and verify the cached ticket, if any
    Rehydrate,
    /// Verification of the cached ticket finished
    VerifyCompleted {
        /// Ticket that was verified
        otp: Otp,
        /// Result
        outcome: CheckOutcome,
    },
    /// User asked to join
    JoinRequested,
    /// Join call finished
    JoinCompleted(Result<Ticket, ApiError>),
}

/// Join page dependencies
#[derive(Clone)]
pub struct JoinEnvironment {
    tickets: Arc<TicketStore>,
    api: Arc<dyn QueueApi>,
    presenter: Arc<dyn PresentationAdapter>,
    join_timeout: Duration,
    verifying: Arc<watch::Sender<bool>>,
}

impl JoinEnvironment {
    /// Assemble an environment; `join_timeout` bounds each join call
    #[must_use]
    pub fn new(
        tickets: Arc<TicketStore>,
        api: Arc<dyn QueueApi>,
        presenter: Arc<dyn PresentationAdapter>,
        join_timeout: Duration,
    ) -> Self {
        Self {
            tickets,
            api,
            presenter,
            join_timeout,
            verifying: Arc::new(watch::channel(false).0),
        }
    }

    /// Follows whether a cached ticket is being verified
    #[must_use]
    pub fn verification(&self) -> watch::Receiver<bool> {
        self.verifying.subscribe()
    }

    /// Ticket cache
    #[must_use]
    pub fn tickets(&self) -> &TicketStore {
        &self.tickets
    }
}

impl std::fmt::Debug for JoinEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinEnvironment")
            .field("join_timeout", &self.join_timeout)
            .finish_non_exhaustive()
    }
}

/// Join page reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinReducer;

impl JoinReducer {
    /// Create a new join reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for JoinReducer {
    type State = JoinState;
    type Action = JoinAction;
    type Environment = JoinEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            JoinAction::Rehydrate => {
                let Some(ticket) = env.tickets.load(&state.queue_id) else {
                    state.ticket = None;
                    return smallvec![present(
                        &env.presenter,
                        vec![PresentationCall::ShowJoinForm(state.queue_id.clone())],
                    )];
                };

                tracing::info!(queue_id = %state.queue_id, otp = %ticket.otp, "Verifying cached ticket");
                let view = ticket.view();
                let otp = ticket.otp.clone();
                state.ticket = Some(ticket);
                state.verifying = true;
                env.verifying.send_replace(true);

                let api = Arc::clone(&env.api);
                smallvec![
                    present(&env.presenter, vec![PresentationCall::ShowTicket(view)]),
                    Effect::future(async move {
                        let outcome = CheckOutcome::from(api.check_status(&otp).await);
                        Some(JoinAction::VerifyCompleted { otp, outcome })
                    }),
                ]
            },

            JoinAction::VerifyCompleted { otp, outcome } => {
                state.verifying = false;
                env.verifying.send_replace(false);
                if state.ticket.as_ref().is_none_or(|ticket| ticket.otp != otp) {
                    tracing::debug!(%otp, "Dropping verification for a replaced ticket");
                    return smallvec![];
                }

                match outcome {
                    CheckOutcome::Snapshot(snapshot) => {
                        match env.tickets.reconcile(&state.queue_id, &otp, &snapshot) {
                            Some(ticket) => {
                                let view = ticket.view();
                                state.ticket = Some(ticket);
                                smallvec![present(&env.presenter, vec![PresentationCall::ShowTicket(view)])]
                            },
                            None => {
                                tracing::info!(%otp, status = %snapshot.status, "Cached ticket already finished");
                                revert(state, env)
                            },
                        }
                    },
                    CheckOutcome::NotFound => {
                        tracing::info!(%otp, "Cached ticket unknown to server");
                        env.tickets.evict(&state.queue_id);
                        revert(state, env)
                    },
                    CheckOutcome::Failed(_) | CheckOutcome::TimedOut | CheckOutcome::Superseded => {
                        tracing::debug!(%otp, "Could not verify cached ticket, keeping it");
                        smallvec![]
                    },
                }
            },

            JoinAction::JoinRequested => {
                if state.joining {
                    tracing::debug!(queue_id = %state.queue_id, "Join already in flight");
                    return smallvec![];
                }

                state.joining = true;
                state.last_error = None;

                let api = Arc::clone(&env.api);
                let queue_id = state.queue_id.clone();
                let bound = env.join_timeout;
                smallvec![
                    present(&env.presenter, vec![PresentationCall::Joining(true)]),
                    Effect::future(async move {
                        let result = tokio::time::timeout(bound, api.join_queue(&queue_id))
                            .await
                            .unwrap_or(Err(ApiError::Timeout));
                        Some(JoinAction::JoinCompleted(result))
                    }),
                ]
            },

            JoinAction::JoinCompleted(result) => {
                state.joining = false;

                match result {
                    Ok(ticket) => {
                        tracing::info!(
                            queue_id = %state.queue_id,
                            otp = %ticket.otp,
                            position = ticket.position,
                            "Joined queue"
                        );
                        let otp = ticket.otp.clone();
                        state.ticket = env.tickets.save(&state.queue_id, ticket);
                        smallvec![present(
                            &env.presenter,
                            vec![PresentationCall::Navigate(Navigation::StatusView { otp })],
                        )]
                    },
                    Err(error) => {
                        tracing::warn!(queue_id = %state.queue_id, error = %error, "Join failed");
                        let message = match error {
                            ApiError::Timeout => "Request timed out. Please try again.".to_string(),
                            ApiError::Rejected(message) => message,
                            _ => "Error joining queue. Please try again.".to_string(),
                        };
                        state.last_error = Some(message.clone());
                        let notification = Notification::error(message);

                        smallvec![present(
                            &env.presenter,
                            vec![
                                PresentationCall::Notify(notification.clone(), vec![notification]),
                                PresentationCall::Joining(false),
                            ],
                        )]
                    },
                }
            },
        }
    }
}

/// Drop the cached ticket and bring back the join form
fn revert(state: &mut JoinState, env: &JoinEnvironment) -> SmallVec<[Effect<JoinAction>; 4]> {
    state.ticket = None;
    smallvec![present(
        &env.presenter,
        vec![PresentationCall::ShowJoinForm(state.queue_id.clone())],
    )]
}
