//! Realtime push channel.
//!
//! [`RealtimeChannel::connect`] opens a transport, subscribes to the ticket
//! and queue topics, and spawns a loop that forwards decoded push events on a
//! bounded channel. The channel never retries on its own: the status reducer
//! owns the reconnect schedule and calls `connect` again, which re-subscribes.

mod event;
mod transport;

pub use event::{ChannelEvent, Frame, PushEvent};
#[cfg(any(test, feature = "test-utils"))]
pub use transport::mock;
pub use transport::{Connector, Transport, WebSocketConnector};

use crate::error::ChannelError;
use crate::ticket::Otp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Topics joined after every connect
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    /// Per-ticket topic
    pub otp: Otp,
    /// Per-queue topic
    pub company_code: String,
}

struct Session {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Push channel handle; clones share the same connection
#[derive(Clone)]
pub struct RealtimeChannel {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    events: mpsc::Sender<ChannelEvent>,
    session: Arc<Mutex<Option<Session>>>,
}

impl RealtimeChannel {
    /// Create a channel and the receiver its events arrive on
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (events, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            connector,
            connect_timeout,
            events,
            session: Arc::new(Mutex::new(None)),
        };
        (channel, rx)
    }

    /// Connect and subscribe, replacing any current connection
    ///
    /// `ChannelEvent::Connected` is emitted once the subscriptions are sent.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::ConnectTimeout`] if connecting exceeds the bound
    /// - [`ChannelError::Connect`] / [`ChannelError::Send`] if the transport fails
    #[tracing::instrument(skip_all, fields(otp = %topics.otp))]
    pub async fn connect(&self, topics: &Topics) -> Result<(), ChannelError> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            stop(previous).await;
        }

        let mut transport = tokio::time::timeout(self.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| ChannelError::ConnectTimeout)??;

        for frame in [
            Frame::join_customer_room(&topics.otp),
            Frame::join_company_room(&topics.company_code),
        ] {
            let text = serde_json::to_string(&frame).map_err(|e| ChannelError::Send(e.to_string()))?;
            transport.send(text).await?;
        }

        tracing::info!(company_code = %topics.company_code, "Subscribed to push channel");

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(transport_loop(transport, self.events.clone(), shutdown_rx));
        *session = Some(Session { shutdown, task });

        Ok(())
    }

    /// Close the current connection, if any; no event is emitted
    pub async fn disconnect(&self) {
        if let Some(previous) = self.session.lock().await.take() {
            stop(previous).await;
        }
    }

    /// Whether a connection is currently open
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

async fn stop(session: Session) {
    let _ = session.shutdown.send(());
    if let Err(error) = session.task.await {
        tracing::debug!(error = %error, "Transport loop ended abnormally");
    }
}

async fn emit(events: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("Channel event receiver dropped");
    }
}

async fn transport_loop(
    mut transport: Box<dyn Transport>,
    events: mpsc::Sender<ChannelEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    emit(&events, ChannelEvent::Connected).await;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("Closing push channel");
                if let Err(error) = transport.close().await {
                    tracing::debug!(error = %error, "Close handshake failed");
                }
                break;
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => match serde_json::from_str::<Frame>(&text) {
                    Ok(frame) => {
                        let name = frame.event.clone();
                        match frame.into_push() {
                            Some(push) => emit(&events, ChannelEvent::Push(push)).await,
                            None => tracing::debug!(event = %name, "Ignoring push event"),
                        }
                    },
                    Err(error) => tracing::debug!(error = %error, "Ignoring malformed frame"),
                },
                Some(Err(error)) => {
                    tracing::warn!(error = %error, "Push channel failed");
                    emit(&events, ChannelEvent::Disconnected { reason: error.to_string() }).await;
                    break;
                },
                None => {
                    tracing::info!("Push channel closed by server");
                    emit(&events, ChannelEvent::Disconnected { reason: "closed by server".to_string() }).await;
                    break;
                },
            },
        }
    }
}
