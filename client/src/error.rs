//! Error types for the queue client.
//!
//! Each boundary has its own enum. Reducers never see these directly: API
//! and channel failures are folded into actions, storage failures are logged
//! and swallowed inside [`TicketStore`](crate::ticket_store::TicketStore).

use thiserror::Error;

/// Errors from the queue HTTP API
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport-level failure (connection refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its time bound
    #[error("Request timed out")]
    Timeout,

    /// Request was superseded or cancelled before completing
    #[error("Request aborted")]
    Aborted,

    /// Server says the ticket does not exist
    #[error("Ticket not found: {0}")]
    NotFound(String),

    /// Server declined the request (`{success: false, error}`)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Response body could not be parsed
    #[error("Response parsing failed: {0}")]
    Parse(String),

    /// Unexpected HTTP status
    #[error("API error (status {status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },
}

impl ApiError {
    /// Whether a later retry may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Parse(_) | Self::Status { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Parse(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Errors from the realtime push channel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Could not establish a connection
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Connecting took longer than the configured bound
    #[error("Connection timed out")]
    ConnectTimeout,

    /// Sending a frame failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The connection was closed
    #[error("Channel closed")]
    Closed,
}

/// Errors from the key-value storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not a JSON object of strings
    #[error("Storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors loading [`ClientConfig`](crate::config::ClientConfig)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Invalid value for {name}: {value}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Top-level errors returned by controller setup
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage could not be opened
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// HTTP client could not be built
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The page runtime stopped
    #[error("Store error: {0}")]
    Store(#[from] walkin_runtime::StoreError),
}
