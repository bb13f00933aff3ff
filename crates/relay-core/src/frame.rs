//! Wire frames exchanged over the persistent connection.
//!
//! Every frame is a JSON object with a `type` discriminator. Three inbound
//! types are reserved for the connection manager itself (see [`ControlFrame`]);
//! everything else is an application frame forwarded to listeners.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::FrameError;

/// Server greeting carrying the assigned connection id.
pub const CONNECTED: &str = "connected";
/// Liveness probe (either direction).
pub const PING: &str = "ping";
/// Liveness reply (either direction).
pub const PONG: &str = "pong";
/// Outbound channel subscription.
pub const SUBSCRIBE: &str = "subscribe";
/// Outbound channel unsubscription.
pub const UNSUBSCRIBE: &str = "unsubscribe";
/// Listener key that observes every non-control frame.
pub const WILDCARD: &str = "*";

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound wire message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Frame type (`connected`, `ping`, `pong`, or an application type).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload; `null` when the server sent none.
    #[serde(default)]
    pub data: Value,
    /// Server timestamp. Informational only, never used for ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Correlation id echoed from an outbound request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Reserved frame types consumed by the connection manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlFrame {
    /// Server assigned a connection id.
    Connected {
        /// Opaque id; empty if the server omitted it.
        connection_id: String,
    },
    /// Peer-initiated liveness probe; must be answered with `pong`.
    Ping,
    /// Reply to our probe.
    Pong,
}

impl EventFrame {
    /// Build an application frame (mostly useful in tests and demos).
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: None,
            request_id: None,
        }
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: Self = serde_json::from_str(text)?;
        if frame.event_type.is_empty() {
            return Err(FrameError::EmptyType);
        }
        Ok(frame)
    }

    /// Classify the frame as a control frame, if it is one.
    pub fn control(&self) -> Option<ControlFrame> {
        match self.event_type.as_str() {
            CONNECTED => {
                let connection_id = self
                    .data
                    .get("connection_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                Some(ControlFrame::Connected { connection_id })
            }
            PING => Some(ControlFrame::Ping),
            PONG => Some(ControlFrame::Pong),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// An outbound wire message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Frame type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload; omitted from the wire for bare control frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Correlation id for request/response exchanges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl OutboundFrame {
    /// Application frame `{type, data}`.
    pub fn app(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data),
            request_id: None,
        }
    }

    /// `{type: "subscribe", data: {channel}}`.
    pub fn subscribe(channel: &str) -> Self {
        Self::app(SUBSCRIBE, json!({ "channel": channel }))
    }

    /// `{type: "unsubscribe", data: {channel}}`.
    pub fn unsubscribe(channel: &str) -> Self {
        Self::app(UNSUBSCRIBE, json!({ "channel": channel }))
    }

    /// `{type: "ping"}`.
    pub fn ping() -> Self {
        Self::bare(PING)
    }

    /// `{type: "pong"}`.
    pub fn pong() -> Self {
        Self::bare(PONG)
    }

    fn bare(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_owned(),
            data: None,
            request_id: None,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
