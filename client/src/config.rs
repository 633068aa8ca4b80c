//! Configuration management for the queue client.
//!
//! Loads configuration from `WALKIN_*` environment variables with defaults
//! matching the hosted service. Durations are given in milliseconds unless
//! the variable name says otherwise.

use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use walkin_runtime::BackoffPolicy;

/// Client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Queue server base URL (`WALKIN_BASE_URL`)
    pub base_url: String,
    /// Push channel URL (`WALKIN_WS_URL`)
    pub ws_url: String,
    /// Ticket cache and preferences file (`WALKIN_STORAGE_PATH`)
    pub storage_path: PathBuf,
    /// Bound on the join call (`WALKIN_JOIN_TIMEOUT_MS`)
    pub join_timeout: Duration,
    /// Optional bound on each status poll (`WALKIN_POLL_TIMEOUT_MS`)
    pub poll_timeout: Option<Duration>,
    /// Status poll period (`WALKIN_POLL_INTERVAL_MS`)
    pub poll_interval: Duration,
    /// Debounce window for `queue_updated` pushes (`WALKIN_MIN_UPDATE_INTERVAL_MS`)
    pub min_update_interval: Duration,
    /// Cached tickets older than this are discarded (`WALKIN_STALENESS_SECS`)
    pub staleness: Duration,
    /// Pause before reloading after a status change (`WALKIN_REFRESH_DELAY_MS`)
    pub refresh_delay: Duration,
    /// Delay of the first status check on page start (`WALKIN_INITIAL_CHECK_DELAY_MS`)
    pub initial_check_delay: Duration,
    /// Delay of the re-check after a `customer_delayed` push (`WALKIN_DELAYED_RECHECK_MS`)
    pub delayed_recheck_delay: Duration,
    /// Delay of the served/serving effects on page start (`WALKIN_START_EFFECT_DELAY_MS`)
    pub start_effect_delay: Duration,
    /// Push channel connect bound (`WALKIN_CONNECT_TIMEOUT_MS`)
    pub connect_timeout: Duration,
    /// Reconnect attempts before giving up (`WALKIN_RECONNECT_ATTEMPTS`)
    pub reconnect_attempts: u32,
    /// First reconnect delay (`WALKIN_RECONNECT_DELAY_MS`)
    pub reconnect_delay: Duration,
    /// Reconnect delay cap (`WALKIN_RECONNECT_MAX_DELAY_MS`)
    pub reconnect_max_delay: Duration,
    /// Reconnect delay growth factor (`WALKIN_RECONNECT_MULTIPLIER`)
    pub reconnect_multiplier: f64,
    /// Notifications kept in history (`WALKIN_NOTIFICATION_HISTORY`)
    pub notification_history: usize,
    /// Buffered push channel events (`WALKIN_CHANNEL_CAPACITY`)
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            ws_url: "ws://localhost:5000/ws".to_string(),
            storage_path: PathBuf::from(".walkin/storage.json"),
            join_timeout: Duration::from_secs(15),
            poll_timeout: None,
            poll_interval: Duration::from_secs(10),
            min_update_interval: Duration::from_secs(2),
            staleness: Duration::from_secs(24 * 60 * 60),
            refresh_delay: Duration::from_millis(1500),
            initial_check_delay: Duration::from_millis(500),
            delayed_recheck_delay: Duration::from_millis(500),
            start_effect_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(3),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_multiplier: 1.5,
            notification_history: 5,
            channel_capacity: 64,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparseable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let vars = Vars(&lookup);

        Ok(Self {
            base_url: vars.string("WALKIN_BASE_URL").unwrap_or(defaults.base_url),
            ws_url: vars.string("WALKIN_WS_URL").unwrap_or(defaults.ws_url),
            storage_path: vars
                .string("WALKIN_STORAGE_PATH")
                .map_or(defaults.storage_path, PathBuf::from),
            join_timeout: vars.millis("WALKIN_JOIN_TIMEOUT_MS")?.unwrap_or(defaults.join_timeout),
            poll_timeout: vars.millis("WALKIN_POLL_TIMEOUT_MS")?.filter(|d| !d.is_zero()),
            poll_interval: vars.millis("WALKIN_POLL_INTERVAL_MS")?.unwrap_or(defaults.poll_interval),
            min_update_interval: vars
                .millis("WALKIN_MIN_UPDATE_INTERVAL_MS")?
                .unwrap_or(defaults.min_update_interval),
            staleness: vars
                .parse::<u64>("WALKIN_STALENESS_SECS")?
                .map_or(defaults.staleness, Duration::from_secs),
            refresh_delay: vars.millis("WALKIN_REFRESH_DELAY_MS")?.unwrap_or(defaults.refresh_delay),
            initial_check_delay: vars
                .millis("WALKIN_INITIAL_CHECK_DELAY_MS")?
                .unwrap_or(defaults.initial_check_delay),
            delayed_recheck_delay: vars
                .millis("WALKIN_DELAYED_RECHECK_MS")?
                .unwrap_or(defaults.delayed_recheck_delay),
            start_effect_delay: vars
                .millis("WALKIN_START_EFFECT_DELAY_MS")?
                .unwrap_or(defaults.start_effect_delay),
            connect_timeout: vars
                .millis("WALKIN_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.connect_timeout),
            reconnect_attempts: vars
                .parse("WALKIN_RECONNECT_ATTEMPTS")?
                .unwrap_or(defaults.reconnect_attempts),
            reconnect_delay: vars
                .millis("WALKIN_RECONNECT_DELAY_MS")?
                .unwrap_or(defaults.reconnect_delay),
            reconnect_max_delay: vars
                .millis("WALKIN_RECONNECT_MAX_DELAY_MS")?
                .unwrap_or(defaults.reconnect_max_delay),
            reconnect_multiplier: vars
                .parse("WALKIN_RECONNECT_MULTIPLIER")?
                .unwrap_or(defaults.reconnect_multiplier),
            notification_history: vars
                .parse("WALKIN_NOTIFICATION_HISTORY")?
                .unwrap_or(defaults.notification_history),
            channel_capacity: vars
                .parse("WALKIN_CHANNEL_CAPACITY")?
                .unwrap_or(defaults.channel_capacity),
        })
    }

    /// Set the server base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the push channel URL
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the storage file
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Set the poll period
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the `queue_updated` debounce window
    #[must_use]
    pub const fn with_min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }

    /// Set the staleness threshold
    #[must_use]
    pub const fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// Set the reconnect schedule
    #[must_use]
    pub const fn with_reconnect(mut self, attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self.reconnect_max_delay = max_delay;
        self
    }

    /// Reconnect schedule as a backoff policy
    #[must_use]
    pub fn reconnect_policy(&self) -> BackoffPolicy {
        BackoffPolicy::builder()
            .max_attempts(self.reconnect_attempts)
            .initial_delay(self.reconnect_delay)
            .max_delay(self.reconnect_max_delay)
            .multiplier(self.reconnect_multiplier)
            .build()
    }

    /// Staleness threshold in the form the ticket cache compares against
    #[must_use]
    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.staleness).unwrap_or(chrono::Duration::MAX)
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ConfigError> {
        self.string(name)
            .map(|raw| {
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name,
                    value: raw.clone(),
                })
            })
            .transpose()
    }

    fn millis(&self, name: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(load(&[]).unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WALKIN_BASE_URL", "https://q.example"),
            ("WALKIN_POLL_INTERVAL_MS", "2500"),
            ("WALKIN_STALENESS_SECS", "60"),
            ("WALKIN_POLL_TIMEOUT_MS", "8000"),
            ("WALKIN_RECONNECT_MULTIPLIER", "2"),
        ])
        .unwrap();

        assert_eq!(config.base_url, "https://q.example");
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.staleness_threshold(), chrono::Duration::seconds(60));
        assert_eq!(config.poll_timeout, Some(Duration::from_secs(8)));
        assert_eq!(config.reconnect_policy().delay_for_attempt(2), Duration::from_secs(6));
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let error = load(&[("WALKIN_RECONNECT_ATTEMPTS", "many")]).unwrap_err();
        assert_eq!(
            error,
            ConfigError::Invalid {
                name: "WALKIN_RECONNECT_ATTEMPTS",
                value: "many".to_string()
            }
        );
    }

    #[test]
    fn test_default_reconnect_policy() {
        let policy = ClientConfig::default().reconnect_policy();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
        assert!(!policy.should_retry(6));
    }
}
