//! Socket abstraction.
//!
//! A [`Transport`] opens a [`Socket`]: a pair of channels owned by a pump
//! task that talks to the real connection. The client only ever does
//! non-blocking `try_send`s on the command side and reads events
//! sequentially on the other, so the supervisor never awaits network I/O
//! while holding its lock.
//!
//! Every socket ends with exactly one [`SocketEvent::Closed`], or with the
//! event channel closing, which the client treats the same way.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use relay_core::errors::TransportError;
use tokio::sync::mpsc;
use url::Url;

/// Instruction for the socket pump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketCommand {
    /// Send one text frame.
    Text(String),
    /// Send a close frame and stop.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Human-readable reason.
        reason: String,
    },
}

impl SocketCommand {
    /// Shorthand for [`SocketCommand::Close`].
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }
}

/// Something the socket pump observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// One inbound text frame.
    Text(String),
    /// The connection ended (close frame, error, or local close).
    Closed {
        /// Close code, if one was exchanged.
        code: Option<u16>,
        /// Reason or error description.
        reason: String,
    },
}

/// Channels connected to an open socket.
#[derive(Debug)]
pub struct Socket {
    /// Outbound commands.
    pub commands: mpsc::Sender<SocketCommand>,
    /// Inbound events, ending with [`SocketEvent::Closed`].
    pub events: mpsc::Receiver<SocketEvent>,
}

/// Opens sockets to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket to `url`.
    ///
    /// `buffer` bounds the command and event channels. The caller applies
    /// the connect timeout.
    async fn open(&self, url: &Url, buffer: usize) -> Result<Socket, TransportError>;
}
