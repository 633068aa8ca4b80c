//! Transport abstraction and the WebSocket implementation.

use crate::error::ChannelError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

/// A connected, text-framed duplex connection
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Send`] if the frame could not be written.
    async fn send(&mut self, message: String) -> Result<(), ChannelError>;

    /// Next text frame; `None` once the peer closed the connection
    async fn recv(&mut self) -> Option<Result<String, ChannelError>>;

    /// Close the connection
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the close handshake fails.
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Opens [`Transport`]s
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new connection
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Connect`] if the server cannot be reached.
    async fn connect(&self) -> Result<Box<dyn Transport>, ChannelError>;
}

/// Connects to a WebSocket endpoint
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Connector for `url` (`ws://` or `wss://`)
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ChannelError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        tracing::debug!(url = %self.url, "WebSocket connected");
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(message))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {},
                Err(e) => return Some(Err(ChannelError::Connect(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }
}

/// In-memory transport for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{ChannelError, Connector, Transport, async_trait};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Script = VecDeque<Option<Result<String, ChannelError>>>;

    /// Yields scripted frames, then stays open until closed
    ///
    /// A scripted `None` closes the connection from the server side.
    pub struct MockTransport {
        incoming: Script,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<(), ChannelError> {
            match self.sent.lock() {
                Ok(mut sent) => sent.push(message),
                Err(poisoned) => poisoned.into_inner().push(message),
            }
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), ChannelError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect; fails once scripts run out
    #[derive(Default)]
    pub struct MockConnector {
        scripts: Mutex<VecDeque<Result<Script, ChannelError>>>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        connects: AtomicUsize,
    }

    impl MockConnector {
        /// No scripted connections
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Next connect succeeds and yields `frames`
        #[must_use]
        pub fn with_connection(self, frames: Vec<Option<Result<String, ChannelError>>>) -> Self {
            self.push(Ok(frames.into()));
            self
        }

        /// Next connect fails with `error`
        #[must_use]
        pub fn with_failure(self, error: ChannelError) -> Self {
            self.push(Err(error));
            self
        }

        /// Every frame sent over any connection
        #[must_use]
        pub fn sent(&self) -> Vec<String> {
            match self.sent.lock() {
                Ok(sent) => sent.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }

        /// Whether any connection was closed by the client
        #[must_use]
        pub fn was_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        /// Number of connect attempts
        #[must_use]
        pub fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn push(&self, script: Result<Script, ChannelError>) {
            match self.scripts.lock() {
                Ok(mut scripts) => scripts.push_back(script),
                Err(poisoned) => poisoned.into_inner().push_back(script),
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>, ChannelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let next = match self.scripts.lock() {
                Ok(mut scripts) => scripts.pop_front(),
                Err(poisoned) => poisoned.into_inner().pop_front(),
            };

            let incoming = next
                .unwrap_or_else(|| Err(ChannelError::Connect("no scripted connection".to_string())))?;

            Ok(Box::new(MockTransport {
                incoming,
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            }))
        }
    }
}
