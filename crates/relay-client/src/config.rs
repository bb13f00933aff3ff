//! Runtime configuration for [`RealtimeClient`](crate::RealtimeClient).
//!
//! Settings files speak milliseconds; the client works in [`Duration`]s.

use std::time::Duration;

use relay_core::backoff::ReconnectPolicy;
use relay_settings::{EndpointSettings, RelaySettings};

use crate::endpoint::Environment;

/// Resolved client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Endpoint resolution rules.
    pub endpoint: EndpointSettings,
    /// Initial host environment (replaceable via `set_environment`).
    pub environment: Environment,
    /// Automatic reconnection schedule.
    pub reconnect: ReconnectPolicy,
    /// Interval between `ping` frames.
    pub heartbeat_interval: Duration,
    /// Consecutive silent intervals before a forced reconnect; `0` disables.
    pub max_missed_heartbeats: u32,
    /// Deadline for opening the socket.
    pub connect_timeout: Duration,
    /// Outbound frame buffer per socket.
    pub outbound_buffer: usize,
    /// Default deadline for correlated requests.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default(), Environment::local())
    }
}

impl ClientConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &RelaySettings, environment: Environment) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            environment,
            reconnect: settings.reconnect.clone(),
            heartbeat_interval: Duration::from_millis(settings.heartbeat.interval_ms.max(1)),
            max_missed_heartbeats: settings.heartbeat.max_missed,
            connect_timeout: Duration::from_millis(settings.connection.connect_timeout_ms),
            outbound_buffer: settings.connection.outbound_buffer.max(1),
            request_timeout: Duration::from_millis(settings.connection.request_timeout_ms),
        }
    }

    /// Replace the endpoint with an explicit URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint.url = Some(url.into());
        self
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Replace heartbeat timing.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, max_missed: u32) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self.max_missed_heartbeats = max_missed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_missed_heartbeats, 3);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.environment, Environment::local());
    }

    #[test]
    fn from_settings_converts_millis() {
        let mut settings = RelaySettings::default();
        settings.heartbeat.interval_ms = 1500;
        settings.connection.outbound_buffer = 8;
        let config = ClientConfig::from_settings(&settings, Environment::local());
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1500));
        assert_eq!(config.outbound_buffer, 8);
    }

    #[test]
    fn builders_override() {
        let config = ClientConfig::default()
            .with_url("ws://example.test/ws")
            .with_heartbeat(Duration::ZERO, 0);
        assert_eq!(config.endpoint.url.as_deref(), Some("ws://example.test/ws"));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1));
        assert_eq!(config.max_missed_heartbeats, 0);
    }
}
