//! HTTP API client for the queue server.

use crate::error::ApiError;
use crate::ticket::{Otp, QueueId, Snapshot, Ticket, TicketStatus};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// The two endpoints the client consumes
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// `POST /api/join_queue/{queue_id}`
    ///
    /// # Errors
    ///
    /// - [`ApiError::Rejected`] when the server declines the join
    /// - [`ApiError::Timeout`] when the join bound elapses
    /// - [`ApiError::Network`] / [`ApiError::Parse`] / [`ApiError::Status`] otherwise
    async fn join_queue(&self, queue_id: &QueueId) -> Result<Ticket, ApiError>;

    /// `GET /api/check_status/{otp}`
    ///
    /// # Errors
    ///
    /// - [`ApiError::NotFound`] when the server no longer knows the ticket
    /// - [`ApiError::Network`] / [`ApiError::Parse`] / [`ApiError::Status`] otherwise
    async fn check_status(&self, otp: &Otp) -> Result<Snapshot, ApiError>;
}

#[derive(Deserialize)]
struct JoinResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    otp: Option<Otp>,
    #[serde(default)]
    cashier_number: Option<u32>,
    #[serde(default)]
    position: u32,
    #[serde(default)]
    status: Option<TicketStatus>,
    #[serde(default, deserialize_with = "crate::ticket::seconds::deserialize")]
    estimated_wait_seconds: u64,
}

/// [`QueueApi`] over HTTP with `reqwest`
#[derive(Clone, Debug)]
pub struct HttpQueueApi {
    client: Client,
    base_url: String,
    join_timeout: Duration,
}

impl HttpQueueApi {
    /// Create a client for the server at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>, join_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            join_timeout,
        }
    }

    /// Server base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl QueueApi for HttpQueueApi {
    #[tracing::instrument(skip_all, fields(queue_id = %queue_id))]
    async fn join_queue(&self, queue_id: &QueueId) -> Result<Ticket, ApiError> {
        let response = self
            .client
            .post(format!("{}/api/join_queue/{queue_id}", self.base_url))
            .timeout(self.join_timeout)
            .send()
            .await?;

        let status = response.status();
        // Declined joins come back as 400 with the same body shape
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<JoinResponse>().await?;

        if body.success == Some(false) || body.error.is_some() {
            let reason = body
                .error
                .unwrap_or_else(|| "Failed to join queue".to_string());
            tracing::info!(reason = %reason, "Join rejected");
            return Err(ApiError::Rejected(reason));
        }

        let otp = body
            .otp
            .ok_or_else(|| ApiError::Parse("join response has no otp".to_string()))?;

        tracing::info!(otp = %otp, position = body.position, "Joined queue");

        Ok(Ticket {
            otp,
            cashier_number: body.cashier_number,
            position: body.position,
            status: body.status.unwrap_or_default(),
            estimated_wait_seconds: body.estimated_wait_seconds,
            last_update: None,
        })
    }

    #[tracing::instrument(skip_all, fields(otp = %otp))]
    async fn check_status(&self, otp: &Otp) -> Result<Snapshot, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/check_status/{otp}", self.base_url))
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.json::<serde_json::Value>().await?;
                if let Some(error) = body.get("error") {
                    let reason = error.as_str().unwrap_or("not found").to_string();
                    return Err(ApiError::NotFound(reason));
                }
                serde_json::from_value(body).map_err(|e| ApiError::Parse(e.to_string()))
            },
            StatusCode::NOT_FOUND => Err(ApiError::NotFound("not found".to_string())),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::Status {
                    status: status.as_u16(),
                    message,
                })
            },
        }
    }
}

/// Scripted [`QueueApi`] for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{ApiError, Otp, QueueApi, QueueId, Snapshot, Ticket, async_trait};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Scripted<T> = Mutex<VecDeque<(Duration, Result<T, ApiError>)>>;

    /// Returns queued responses in order, each after its own delay
    ///
    /// An empty script answers `ApiError::Network("no scripted response")`.
    #[derive(Default)]
    pub struct MockQueueApi {
        joins: Scripted<Ticket>,
        checks: Scripted<Snapshot>,
        join_calls: AtomicUsize,
        check_calls: AtomicUsize,
    }

    impl MockQueueApi {
        /// Empty script
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a join response
        #[must_use]
        pub fn with_join(self, result: Result<Ticket, ApiError>) -> Self {
            push(&self.joins, Duration::ZERO, result);
            self
        }

        /// Queue a join response returned after `delay`
        pub fn push_join(&self, delay: Duration, result: Result<Ticket, ApiError>) {
            push(&self.joins, delay, result);
        }

        /// Queue a status response returned immediately
        #[must_use]
        pub fn with_status(self, result: Result<Snapshot, ApiError>) -> Self {
            self.push_status(Duration::ZERO, result);
            self
        }

        /// Queue a status response returned after `delay`
        pub fn push_status(&self, delay: Duration, result: Result<Snapshot, ApiError>) {
            push(&self.checks, delay, result);
        }

        /// Number of `join_queue` calls so far
        #[must_use]
        pub fn join_calls(&self) -> usize {
            self.join_calls.load(Ordering::SeqCst)
        }

        /// Number of `check_status` calls so far
        #[must_use]
        pub fn check_calls(&self) -> usize {
            self.check_calls.load(Ordering::SeqCst)
        }
    }

    fn push<T>(script: &Scripted<T>, delay: Duration, result: Result<T, ApiError>) {
        match script.lock() {
            Ok(mut script) => script.push_back((delay, result)),
            Err(poisoned) => poisoned.into_inner().push_back((delay, result)),
        }
    }

    async fn next<T>(script: &Scripted<T>) -> Result<T, ApiError> {
        let entry = match script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        let Some((delay, result)) = entry else {
            return Err(ApiError::Network("no scripted response".to_string()));
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    #[async_trait]
    impl QueueApi for MockQueueApi {
        async fn join_queue(&self, _queue_id: &QueueId) -> Result<Ticket, ApiError> {
            self.join_calls.fetch_add(1, Ordering::SeqCst);
            next(&self.joins).await
        }

        async fn check_status(&self, _otp: &Otp) -> Result<Snapshot, ApiError> {
            self.check_calls.fetch_add(1, Ordering::SeqCst);
            next(&self.checks).await
        }
    }
}
