//! Reducer for the status page.
//!
//! Every snapshot, push event, and timer tick goes through
//! [`StatusReducer`]. Snapshots are accepted only from the current check,
//! terminal statuses evict the cached ticket, and authoritative absence sends
//! the page back to the join view.

use crate::channel::{PushEvent, Topics};
use crate::poller::{CheckOutcome, RequestId};
use crate::presentation::{Navigation, Notification, PresentationCall, present, present_after};
use crate::reconcile::{
    CheckTrigger, Connection, Phase, StatusAction, StatusEnvironment, StatusState,
};
use crate::ticket::{Snapshot, Ticket, TicketStatus};
use walkin_core::effect::{Effect, EffectId};
use walkin_core::reducer::Reducer;
use walkin_core::{SmallVec, smallvec};

/// Poll interval timer
pub const POLL_TIMER: EffectId = EffectId::new("status.poll_timer");
/// The status check in flight
pub const CHECK: EffectId = EffectId::new("status.check");
/// First check after start
pub const INITIAL_CHECK: EffectId = EffectId::new("status.initial_check");
/// Re-check after a `customer_delayed` push
pub const DELAYED_CHECK: EffectId = EffectId::new("status.delayed_check");
/// Reconnect backoff
pub const RECONNECT: EffectId = EffectId::new("status.reconnect");
/// Channel connect in progress
pub const CONNECT: EffectId = EffectId::new("status.connect");
/// Pending status-change refresh
pub const REFRESH: EffectId = EffectId::new("status.refresh");
/// Served/serving effects shown shortly after start
pub const START_EFFECTS: EffectId = EffectId::new("status.start_effects");

/// Reconciles server snapshots and push events into the status page
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusReducer;

impl StatusReducer {
    /// Create a new status reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for StatusReducer {
    type State = StatusState;
    type Action = StatusAction;
    type Environment = StatusEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut step = Step::new(env);

        match action {
            StatusAction::Start => start(state, &mut step),

            StatusAction::PollTick => {
                if state.is_active() {
                    check(state, &mut step, CheckTrigger::Timer);
                    step.effect(poll_timer(env));
                }
            },

            StatusAction::CheckNow => {
                if state.is_active() {
                    check(state, &mut step, CheckTrigger::Manual);
                }
            },

            StatusAction::CheckRequested { trigger } => {
                if state.is_active() {
                    check(state, &mut step, trigger);
                }
            },

            StatusAction::StatusReceived {
                request_id,
                outcome,
            } => status_received(state, &mut step, request_id, outcome),

            StatusAction::Push(event) => push(state, &mut step, event),

            StatusAction::ChannelConnected => channel_connected(state, &mut step),

            StatusAction::ChannelDisconnected { reason } => {
                if state.is_active() {
                    tracing::info!(otp = %state.otp, reason = %reason, "Push channel disconnected");
                    state.connection = Connection::Disconnected;
                    step.notify(
                        state,
                        Notification::warning("Disconnected from updates. Will try reconnecting..."),
                    );
                    step.call(PresentationCall::Connection(false));
                    schedule_reconnect(state, &mut step);
                }
            },

            StatusAction::ChannelFailed { message } => {
                if state.is_active() {
                    tracing::warn!(otp = %state.otp, error = %message, "Push channel connect failed");
                    state.connection = Connection::Disconnected;
                    step.notify(
                        state,
                        Notification::info("Connection issue. Using periodic updates instead"),
                    );
                    step.call(PresentationCall::Connection(false));
                    schedule_reconnect(state, &mut step);
                }
            },

            StatusAction::ReconnectDue => {
                state.reconnect_pending = false;
                if state.is_active() && state.connection == Connection::Disconnected {
                    tracing::debug!(otp = %state.otp, attempt = state.reconnect_attempts, "Reconnecting");
                    connect(state, &mut step);
                }
            },

            StatusAction::RefreshView => {
                state.refresh_scheduled = false;
                if matches!(state.phase, Phase::Active | Phase::Finished) {
                    refresh(state, &mut step);
                }
            },

            StatusAction::ToggleSound => {
                state.sound_enabled = !state.sound_enabled;
                env.preferences().set_sound_enabled(state.sound_enabled);
                step.call(PresentationCall::Sound(state.sound_enabled));
            },

            StatusAction::ToggleTheme => {
                state.theme = state.theme.toggled();
                env.preferences().set_theme(state.theme);
                step.call(PresentationCall::Theme(state.theme));
            },

            StatusAction::JoinNewQueue => {
                let removed = env.tickets().clear_all();
                tracing::info!(queue_id = %state.queue_id, removed, "Leaving for a new queue");
                state.ticket = None;
                wind_down(state, &mut step, Phase::Stopped);
                step.call(PresentationCall::Navigate(Navigation::JoinView {
                    queue_id: state.queue_id.clone(),
                }));
            },

            StatusAction::Stop => {
                if state.phase != Phase::Stopped {
                    tracing::debug!(otp = %state.otp, "Stopping status page");
                    wind_down(state, &mut step, Phase::Stopped);
                }
            },
        }

        step.into_effects()
    }
}

/// Effects and presentation calls collected while reducing one action
struct Step<'a> {
    env: &'a StatusEnvironment,
    effects: SmallVec<[Effect<StatusAction>; 4]>,
    calls: Vec<PresentationCall>,
}

impl<'a> Step<'a> {
    fn new(env: &'a StatusEnvironment) -> Self {
        Self {
            env,
            effects: smallvec![],
            calls: Vec::new(),
        }
    }

    fn effect(&mut self, effect: Effect<StatusAction>) {
        self.effects.push(effect);
    }

    fn call(&mut self, call: PresentationCall) {
        self.calls.push(call);
    }

    fn notify(&mut self, state: &mut StatusState, notification: Notification) {
        state.push_notification(notification.clone(), self.env.config().notification_history);
        let history = state.notifications.iter().cloned().collect();
        self.calls.push(PresentationCall::Notify(notification, history));
    }

    /// Presentation calls run first, as one ordered effect
    fn into_effects(self) -> SmallVec<[Effect<StatusAction>; 4]> {
        let mut effects = self.effects;
        if !self.calls.is_empty() {
            effects.insert(0, present(self.env.presenter(), self.calls));
        }
        effects
    }
}

fn start(state: &mut StatusState, step: &mut Step<'_>) {
    if state.phase != Phase::Idle {
        tracing::debug!(otp = %state.otp, phase = ?state.phase, "Ignoring repeated start");
        return;
    }

    let env = step.env;
    state.phase = Phase::Active;
    state.sound_enabled = env.preferences().sound_enabled();
    state.theme = env.preferences().theme();

    tracing::info!(otp = %state.otp, queue_id = %state.queue_id, "Status page started");

    step.call(PresentationCall::Theme(state.theme));
    if let Some(ticket) = &state.ticket {
        step.call(PresentationCall::Accept(ticket.view()));
    }

    let delay = env.config().start_effect_delay;
    match &state.rendered_status {
        Some(TicketStatus::Served) => step.effect(
            present_after(env.presenter(), delay, vec![PresentationCall::Terminal(TicketStatus::Served)])
                .cancellable(START_EFFECTS),
        ),
        Some(TicketStatus::Serving) if state.sound_enabled => {
            let cashier_number = state.ticket.as_ref().and_then(|t| t.cashier_number);
            step.effect(
                present_after(
                    env.presenter(),
                    delay,
                    vec![PresentationCall::Turn {
                        cashier_number,
                        sound_enabled: true,
                    }],
                )
                .cancellable(START_EFFECTS),
            );
        },
        _ => {},
    }

    step.effect(
        Effect::delay(
            env.config().initial_check_delay,
            StatusAction::CheckRequested {
                trigger: CheckTrigger::Initial,
            },
        )
        .cancellable(INITIAL_CHECK),
    );
    step.effect(poll_timer(env));
    connect(state, step);
}

fn poll_timer(env: &StatusEnvironment) -> Effect<StatusAction> {
    Effect::delay(env.config().poll_interval, StatusAction::PollTick).cancellable(POLL_TIMER)
}

/// Issue a check under a fresh request id, superseding any in flight
fn check(state: &mut StatusState, step: &mut Step<'_>, trigger: CheckTrigger) {
    let request_id = state.next_request();
    tracing::debug!(otp = %state.otp, request_id = %request_id, ?trigger, "Checking status");

    if trigger == CheckTrigger::Manual {
        step.notify(state, Notification::info("Checking for updates..."));
    }

    let poller = step.env.poller().clone();
    let otp = state.otp.clone();
    step.effect(
        Effect::future(async move {
            let outcome = poller.check_status(request_id, &otp).await;
            Some(StatusAction::StatusReceived {
                request_id,
                outcome,
            })
        })
        .cancellable(CHECK),
    );
}

fn status_received(
    state: &mut StatusState,
    step: &mut Step<'_>,
    request_id: RequestId,
    outcome: CheckOutcome,
) {
    if !state.is_active() {
        tracing::debug!(otp = %state.otp, request_id = %request_id, "Dropping status for inactive page");
        return;
    }
    if state.current_request != Some(request_id) {
        tracing::debug!(otp = %state.otp, request_id = %request_id, "Dropping superseded status");
        return;
    }
    state.current_request = None;

    match outcome {
        CheckOutcome::Snapshot(snapshot) => accept(state, step, &snapshot),
        CheckOutcome::NotFound => {
            tracing::info!(otp = %state.otp, queue_id = %state.queue_id, "Ticket unknown to server, evicting");
            step.env.tickets().evict(&state.queue_id);
            state.ticket = None;
            wind_down(state, step, Phase::Stopped);
            step.call(PresentationCall::Navigate(Navigation::JoinView {
                queue_id: state.queue_id.clone(),
            }));
        },
        CheckOutcome::Failed(error) => {
            tracing::debug!(otp = %state.otp, error = %error, "Will retry on the next tick");
            step.notify(state, Notification::error("Error checking for updates. Will retry..."));
            if state.connection == Connection::Disconnected {
                schedule_reconnect(state, step);
            }
        },
        CheckOutcome::TimedOut | CheckOutcome::Superseded => {
            tracing::trace!(otp = %state.otp, request_id = %request_id, "Check ended without a result");
        },
    }
}

/// Merge an accepted snapshot, persist it, and render
fn accept(state: &mut StatusState, step: &mut Step<'_>, snapshot: &Snapshot) {
    let env = step.env;
    let previous_position = state.ticket.as_ref().map(|ticket| ticket.position);
    let was_cashier_active = state.cashier_active;
    state.last_accepted_at = Some(env.clock().now());
    state.cashier_active = snapshot.cashier_is_active;

    let ticket = env
        .tickets()
        .reconcile(&state.queue_id, &state.otp, snapshot)
        .unwrap_or_else(|| {
            let mut ticket = state
                .ticket
                .clone()
                .unwrap_or_else(|| Ticket::from_snapshot(state.otp.clone(), snapshot));
            ticket.merge(snapshot);
            ticket
        });

    step.call(PresentationCall::Accept(ticket.view()));

    if previous_position.is_some_and(|position| position != ticket.position) {
        step.notify(state, Notification::info(format!("Position updated: {}", ticket.position)));
    }

    if snapshot.cashier_is_active == Some(false) && was_cashier_active != Some(false) {
        step.notify(
            state,
            Notification::warning("Your cashier is currently inactive. Service may be delayed."),
        );
    }

    let status = ticket.status.clone();
    state.ticket = Some(ticket);

    if status.is_terminal() {
        tracing::info!(otp = %state.otp, status = %status, "Ticket reached a terminal status");
        step.call(PresentationCall::Terminal(status.clone()));
        wind_down(state, step, Phase::Finished);
    }

    let changed = state.rendered_status.as_ref().map(|rendered| *rendered != status);
    match changed {
        None => state.rendered_status = Some(status),
        Some(true) if !state.refresh_scheduled => {
            tracing::debug!(otp = %state.otp, to = %status, "Status changed");
            step.notify(
                state,
                Notification::info(format!("Status changed to: {status}. Refreshing page...")),
            );
            state.refresh_scheduled = true;
            step.effect(
                Effect::delay(env.config().refresh_delay, StatusAction::RefreshView).cancellable(REFRESH),
            );
        },
        Some(_) => {},
    }
}

fn push(state: &mut StatusState, step: &mut Step<'_>, event: PushEvent) {
    if !state.is_active() {
        return;
    }
    if event.otp().is_some_and(|otp| *otp != state.otp) {
        tracing::trace!(otp = %state.otp, "Ignoring push for another ticket");
        return;
    }

    match event {
        PushEvent::Turn { cashier_number, .. } => {
            let cashier_number =
                cashier_number.or_else(|| state.ticket.as_ref().and_then(|t| t.cashier_number));
            let message = match cashier_number {
                Some(n) => format!("It's your turn! Proceed to Cashier #{n}"),
                None => "It's your turn!".to_string(),
            };
            tracing::info!(otp = %state.otp, ?cashier_number, "Customer called");
            step.notify(state, Notification::info(message));
            step.call(PresentationCall::Turn {
                cashier_number,
                sound_enabled: state.sound_enabled,
            });

            // Render as serving now; the reload check confirms it
            if let Some(ticket) = state.ticket.as_mut() {
                ticket.status = TicketStatus::Serving;
                ticket.position = 0;
                if cashier_number.is_some() {
                    ticket.cashier_number = cashier_number;
                }
                if let Some(saved) = step.env.tickets().save(&state.queue_id, ticket.clone()) {
                    *ticket = saved;
                }
            }
            state.rendered_status = Some(TicketStatus::Serving);
            refresh_now(state, step);
        },
        PushEvent::Removed { .. } => {
            tracing::info!(otp = %state.otp, "Customer removed by staff");
            step.notify(state, Notification::warning("You've been removed from the queue"));
            step.env.tickets().evict(&state.queue_id);
            state.ticket = None;
            state.rendered_status = Some(TicketStatus::Removed);
            step.call(PresentationCall::Terminal(TicketStatus::Removed));
            wind_down(state, step, Phase::Finished);
            refresh_now(state, step);
        },
        PushEvent::Delayed { .. } => {
            step.notify(
                state,
                Notification::warning(
                    "Your service has been delayed. You have been moved back in the queue.",
                ),
            );
            let delay = step.env.config().delayed_recheck_delay;
            step.effect(
                Effect::delay(
                    delay,
                    StatusAction::CheckRequested {
                        trigger: CheckTrigger::Push,
                    },
                )
                .cancellable(DELAYED_CHECK),
            );
        },
        PushEvent::QueueUpdated => {
            step.notify(
                state,
                Notification::info("Queue positions have been updated. Refreshing your status..."),
            );
            if recently_accepted(state, step.env) {
                tracing::debug!(otp = %state.otp, "Queue update within debounce window, skipping check");
            } else {
                check(state, step, CheckTrigger::Push);
            }
        },
    }
}

/// Whether the last accepted snapshot is younger than the debounce window
fn recently_accepted(state: &StatusState, env: &StatusEnvironment) -> bool {
    let window = chrono::Duration::from_std(env.config().min_update_interval)
        .unwrap_or(chrono::Duration::MAX);
    state
        .last_accepted_at
        .is_some_and(|at| env.clock().now() - at < window)
}

/// Refresh immediately, replacing any scheduled refresh
fn refresh_now(state: &mut StatusState, step: &mut Step<'_>) {
    state.refresh_scheduled = false;
    step.effect(Effect::Cancel(REFRESH));
    refresh(state, step);
}

/// Re-render from the cached ticket and check again, as a reloaded page would
fn refresh(state: &mut StatusState, step: &mut Step<'_>) {
    step.call(PresentationCall::Navigate(Navigation::Reload));
    if let Some(ticket) = &state.ticket {
        step.call(PresentationCall::Accept(ticket.view()));
        state.rendered_status = Some(ticket.status.clone());
    }
    if state.is_active() {
        check(state, step, CheckTrigger::Reload);
    }
}

fn topics(state: &StatusState) -> Topics {
    Topics {
        otp: state.otp.clone(),
        company_code: state.queue_id.as_str().to_string(),
    }
}

fn connect(state: &mut StatusState, step: &mut Step<'_>) {
    let Some(channel) = step.env.channel().cloned() else {
        return;
    };
    state.connection = Connection::Connecting;

    let topics = topics(state);
    step.effect(
        Effect::future(async move {
            match channel.connect(&topics).await {
                Ok(()) => None,
                Err(error) => Some(StatusAction::ChannelFailed {
                    message: error.to_string(),
                }),
            }
        })
        .cancellable(CONNECT),
    );
}

fn channel_connected(state: &mut StatusState, step: &mut Step<'_>) {
    if !state.is_active() {
        return;
    }

    let was_reconnect = state.reconnect_attempts > 0;
    tracing::info!(otp = %state.otp, was_reconnect, "Push channel connected");

    state.connection = Connection::Connected;
    state.reconnect_attempts = 0;
    state.reconnect_pending = false;
    step.effect(Effect::Cancel(RECONNECT));
    step.notify(state, Notification::info("Connected to real-time updates"));
    step.call(PresentationCall::Connection(true));

    if was_reconnect {
        check(state, step, CheckTrigger::Reconnect);
    }
}

/// Schedule the next reconnect unless one is pending or attempts are used up
fn schedule_reconnect(state: &mut StatusState, step: &mut Step<'_>) {
    if step.env.channel().is_none() || state.reconnect_pending {
        return;
    }

    let policy = step.env.reconnect_policy();
    let attempt = state.reconnect_attempts + 1;
    if !policy.should_retry(attempt) {
        tracing::info!(
            otp = %state.otp,
            attempts = state.reconnect_attempts,
            "Giving up on the push channel, polling only"
        );
        return;
    }

    let delay = policy.delay_for_attempt(attempt);
    state.reconnect_attempts = attempt;
    state.reconnect_pending = true;

    tracing::info!(
        otp = %state.otp,
        attempt,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        "Scheduling reconnect"
    );
    step.effect(Effect::delay(delay, StatusAction::ReconnectDue).cancellable(RECONNECT));
}

/// Stop timers, in-flight work, and the channel
///
/// A finished page keeps its pending refresh; a stopped page does not.
fn wind_down(state: &mut StatusState, step: &mut Step<'_>, phase: Phase) {
    state.phase = phase;
    state.current_request = None;
    state.reconnect_pending = false;
    state.connection = Connection::Disconnected;

    let mut ids = vec![
        POLL_TIMER,
        CHECK,
        INITIAL_CHECK,
        DELAYED_CHECK,
        RECONNECT,
        CONNECT,
        START_EFFECTS,
    ];
    if phase == Phase::Stopped {
        state.refresh_scheduled = false;
        ids.push(REFRESH);
    }
    step.effect(Effect::merge(ids.into_iter().map(Effect::Cancel).collect()));

    step.env.poller().cancel();

    if let Some(channel) = step.env.channel().cloned() {
        step.effect(Effect::future(async move {
            channel.disconnect().await;
            None
        }));
    }
}
