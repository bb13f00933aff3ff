//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial JSON
//! files are accepted; missing fields take their compiled default.

mod connection;
mod endpoint;

pub use connection::*;
pub use endpoint::*;
pub use relay_core::backoff::ReconnectPolicy;
pub use relay_core::logging::LogFormat;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "endpoint": { "url": "wss://automation.example.com/ws" },
///   "reconnect": { "maxAttempts": 10 },
///   "heartbeat": { "intervalMs": 15000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Where to connect.
    pub endpoint: EndpointSettings,
    /// Automatic reconnection schedule.
    pub reconnect: ReconnectPolicy,
    /// Keep-alive probing.
    pub heartbeat: HeartbeatSettings,
    /// Socket-level limits and timeouts.
    pub connection: ConnectionSettings,
    /// Authentication watcher.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the connection manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat.intervalMs must be > 0".into(),
            ));
        }
        if self.connection.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.outboundBuffer must be > 0".into(),
            ));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(SettingsError::InvalidValue(
                "reconnect.multiplier must be >= 1.0".into(),
            ));
        }
        if self.auth.watch_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "auth.watchIntervalMs must be > 0".into(),
            ));
        }
        Ok(())
    }
}
