//! Heartbeat, connection, auth-watch, and logging settings.
//!
//! Grouped here because each section is only a handful of fields.

use serde::{Deserialize, Serialize};

use relay_core::logging::LogFormat;

/// Keep-alive probing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Interval between `ping` frames in milliseconds.
    pub interval_ms: u64,
    /// Consecutive silent intervals before the socket is force-closed.
    /// `0` disables detection.
    pub max_missed: u32,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            max_missed: 3,
        }
    }
}

/// Socket-level limits and timeouts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Deadline for opening the socket in milliseconds.
    pub connect_timeout_ms: u64,
    /// Outbound frames buffered per socket before `send` reports failure.
    pub outbound_buffer: usize,
    /// Default deadline for correlated requests in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            outbound_buffer: 1024,
            request_timeout_ms: 30_000,
        }
    }
}

/// Authentication watcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// How often the auth state is reconciled with the connection, in ms.
    pub watch_interval_ms: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            watch_interval_ms: 5_000,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_defaults() {
        let hb = HeartbeatSettings::default();
        assert_eq!(hb.interval_ms, 30_000);
        assert_eq!(hb.max_missed, 3);
    }

    #[test]
    fn connection_defaults() {
        let conn = ConnectionSettings::default();
        assert_eq!(conn.connect_timeout_ms, 10_000);
        assert_eq!(conn.outbound_buffer, 1024);
        assert_eq!(conn.request_timeout_ms, 30_000);
    }

    #[test]
    fn logging_format_from_json() {
        let logging: LoggingSettings = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "info");
    }

    #[test]
    fn heartbeat_disable_detection() {
        let hb: HeartbeatSettings = serde_json::from_str(r#"{"maxMissed":0}"#).unwrap();
        assert_eq!(hb.max_missed, 0);
        assert_eq!(hb.interval_ms, 30_000);
    }
}
