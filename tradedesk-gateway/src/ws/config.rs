//! Connection manager configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradedesk_core::config::{Configurable, EnvLookup, Validatable, parse_override};
use tradedesk_core::error::ConfigError;

/// Configuration for a [`ConnectionManager`](super::ConnectionManager).
///
/// Contains the endpoint, reconnection parameters and heartbeat cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket endpoint URL.
    pub url: String,

    /// Constant delay between reconnection attempts in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Maximum number of consecutive reconnection attempts (0 = never reconnect).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Keep-alive probe interval in milliseconds (0 = no heartbeat).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Open timeout applied by the live transport, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Subscription channel that matches every inbound message.
    #[serde(default = "default_wildcard_channel")]
    pub wildcard_channel: String,

    /// Whether a manual disconnect discards messages still waiting in the outbound queue.
    #[serde(default = "default_clear_queue_on_disconnect")]
    pub clear_queue_on_disconnect: bool,
}

fn default_reconnect_interval_ms() -> u64 {
    3_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_wildcard_channel() -> String {
    "*".to_string()
}

fn default_clear_queue_on_disconnect() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            wildcard_channel: default_wildcard_channel(),
            clear_queue_on_disconnect: default_clear_queue_on_disconnect(),
        }
    }
}

impl ConnectionConfig {
    /// Creates a new builder for `ConnectionConfig`.
    #[must_use]
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Returns the reconnect interval as a Duration.
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Returns the heartbeat interval, or `None` when the heartbeat is disabled.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    /// Returns the open timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Validatable for ConnectionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::missing_field_in_section("url", "connection"));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::invalid_value(
                "url",
                format!("'{}' must use the ws:// or wss:// scheme", self.url),
            ));
        }
        if self.wildcard_channel.is_empty() {
            return Err(ConfigError::invalid_value(
                "wildcard_channel",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

impl Configurable for ConnectionConfig {
    fn apply_overrides_with(
        &mut self,
        prefix: &str,
        lookup: EnvLookup<'_>,
    ) -> Result<(), ConfigError> {
        let name = format!("{prefix}_WS_URL");
        if let Some(url) = lookup(&name) {
            self.url = url;
        }

        let name = format!("{prefix}_RECONNECT_INTERVAL_MS");
        if let Some(raw) = lookup(&name) {
            self.reconnect_interval_ms = parse_override(&name, &raw)?;
        }

        let name = format!("{prefix}_MAX_RECONNECT_ATTEMPTS");
        if let Some(raw) = lookup(&name) {
            self.max_reconnect_attempts = parse_override(&name, &raw)?;
        }

        let name = format!("{prefix}_HEARTBEAT_INTERVAL_MS");
        if let Some(raw) = lookup(&name) {
            self.heartbeat_interval_ms = parse_override(&name, &raw)?;
        }

        Ok(())
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        vec![
            format!("{prefix}_WS_URL"),
            format!("{prefix}_RECONNECT_INTERVAL_MS"),
            format!("{prefix}_MAX_RECONNECT_ATTEMPTS"),
            format!("{prefix}_HEARTBEAT_INTERVAL_MS"),
        ]
    }
}

/// Builder for `ConnectionConfig`.
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    url: Option<String>,
    reconnect_interval_ms: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    heartbeat_interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    wildcard_channel: Option<String>,
    clear_queue_on_disconnect: Option<bool>,
}

impl ConnectionConfigBuilder {
    /// Sets the WebSocket URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the delay between reconnection attempts.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = Some(duration_ms(interval));
        self
    }

    /// Sets the maximum reconnection attempts.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Sets the heartbeat interval. `Duration::ZERO` disables the heartbeat.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = Some(duration_ms(interval));
        self
    }

    /// Sets the open timeout used by the live transport.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Sets the wildcard subscription channel.
    #[must_use]
    pub fn wildcard_channel(mut self, channel: impl Into<String>) -> Self {
        self.wildcard_channel = Some(channel.into());
        self
    }

    /// Sets whether a manual disconnect clears the outbound queue.
    #[must_use]
    pub fn clear_queue_on_disconnect(mut self, clear: bool) -> Self {
        self.clear_queue_on_disconnect = Some(clear);
        self
    }

    /// Builds the `ConnectionConfig`.
    #[must_use]
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.url.unwrap_or_default(),
            reconnect_interval_ms: self
                .reconnect_interval_ms
                .unwrap_or_else(default_reconnect_interval_ms),
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or_else(default_max_reconnect_attempts),
            heartbeat_interval_ms: self
                .heartbeat_interval_ms
                .unwrap_or_else(default_heartbeat_interval_ms),
            connect_timeout_ms: self
                .connect_timeout_ms
                .unwrap_or_else(default_connect_timeout_ms),
            wildcard_channel: self
                .wildcard_channel
                .unwrap_or_else(default_wildcard_channel),
            clear_queue_on_disconnect: self
                .clear_queue_on_disconnect
                .unwrap_or_else(default_clear_queue_on_disconnect),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
