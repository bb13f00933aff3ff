//! Connection lifecycle state and the observable status snapshot.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the persistent connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket and no attempt in flight.
    #[default]
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open and frames flow.
    Open,
    /// An explicit disconnect was requested and the transport has not yet
    /// confirmed the close.
    Closing,
}

impl ConnectionState {
    /// Stable lowercase name, as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published on every state transition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Server-assigned id, once a `connected` frame arrived on this socket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Automatic reconnects scheduled since the last successful open.
    pub reconnect_attempts: u32,
}

impl ConnectionStatus {
    /// True only while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.is_connected());
        assert!(status.connection_id.is_none());
    }

    #[test]
    fn only_open_counts_as_connected() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Closing,
        ] {
            let status = ConnectionStatus {
                state,
                ..Default::default()
            };
            assert!(!status.is_connected(), "{state} reported connected");
        }
        let open = ConnectionStatus {
            state: ConnectionState::Open,
            ..Default::default()
        };
        assert!(open.is_connected());
    }

    #[test]
    fn serializes_lowercase_state() {
        let status = ConnectionStatus {
            state: ConnectionState::Open,
            connection_id: Some("c-1".into()),
            reconnect_attempts: 0,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "open");
        assert_eq!(json["connectionId"], "c-1");
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
