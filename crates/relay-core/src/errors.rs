//! Error hierarchy for the relay client.
//!
//! Each failure domain gets its own [`thiserror`] enum:
//!
//! - [`TransportError`]: opening the socket failed (funneled into reconnects)
//! - [`FrameError`]: an inbound frame could not be decoded (frame dropped)
//! - [`RequestError`]: a correlated request could not complete
//!
//! Handler failures are plain boxed errors ([`HandlerError`]) so callers can
//! return whatever error type their own code produces.

use thiserror::Error;

/// Error returned by an event handler. Logged by the dispatcher, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by event handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Failure to establish the persistent connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL could not be built from the environment.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    /// The transport refused or failed the connection attempt.
    #[error("connect failed: {context}")]
    Connect {
        /// What went wrong.
        context: String,
    },

    /// The connection attempt did not complete in time.
    #[error("connect timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured connect timeout.
        timeout_ms: u64,
    },
}

impl TransportError {
    /// Shorthand for a [`TransportError::Connect`] with the given context.
    pub fn connect(context: impl Into<String>) -> Self {
        Self::Connect {
            context: context.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound frame that could not be decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload was not valid JSON or did not match the frame shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame decoded but carried an empty `type`.
    #[error("frame has an empty type")]
    EmptyType,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a correlated request/response exchange.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request could not be sent because no connection is open.
    #[error("not connected")]
    NotConnected,

    /// No response arrived within the deadline.
    #[error("request {request_type} timed out after {timeout_ms}ms")]
    Timeout {
        /// The request's frame type.
        request_type: String,
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// The connection closed while the request was pending.
    #[error("connection closed before a response arrived")]
    Disconnected,

    /// The request payload could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn transport_connect_display() {
        let err = TransportError::connect("refused");
        assert_eq!(err.to_string(), "connect failed: refused");
    }

    #[test]
    fn transport_timeout_display() {
        let err = TransportError::Timeout { timeout_ms: 1500 };
        assert_eq!(err.to_string(), "connect timed out after 1500ms");
    }

    #[test]
    fn frame_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: FrameError = json_err.into();
        assert_matches!(err, FrameError::Malformed(_));
        assert!(err.to_string().starts_with("malformed frame"));
    }

    #[test]
    fn request_timeout_display() {
        let err = RequestError::Timeout {
            request_type: "report.fetch".into(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "request report.fetch timed out after 250ms");
    }

    #[test]
    fn handler_error_boxes_any_error() {
        let err: HandlerError = "bad payload".into();
        assert_eq!(err.to_string(), "bad payload");
    }
}
