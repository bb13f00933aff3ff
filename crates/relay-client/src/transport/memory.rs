//! In-process transport for tests and demos.
//!
//! Each successful [`Transport::open`] hands the server side of the new
//! socket to the [`MemoryAcceptor`] as a [`MemoryPeer`]. Dropping the peer
//! looks like a network drop to the client; [`MemoryPeer::close`] looks like
//! a server close frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::errors::TransportError;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use super::{Socket, SocketCommand, SocketEvent, Transport};

/// Transport whose sockets terminate in-process.
#[derive(Debug)]
pub struct MemoryTransport {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusals: AtomicU32,
    attempts: AtomicU32,
    urls: Mutex<Vec<Url>>,
}

impl MemoryTransport {
    /// Create a transport and the acceptor receiving its server sides.
    pub fn new() -> (Arc<Self>, MemoryAcceptor) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            peers: tx,
            refusals: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            urls: Mutex::new(Vec::new()),
        });
        (transport, MemoryAcceptor { rx })
    }

    /// Fail the next `n` open attempts with a connect error.
    pub fn refuse_next(&self, n: u32) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    /// Open attempts so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// URLs of every open attempt, in order.
    pub fn urls(&self) -> Vec<Url> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &Url, buffer: usize) -> Result<Socket, TransportError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.clone());

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::connect("connection refused"));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let peer = MemoryPeer {
            url: url.clone(),
            commands: cmd_rx,
            events: event_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::connect("no acceptor listening"))?;

        Ok(Socket {
            commands: cmd_tx,
            events: event_rx,
        })
    }
}

/// Receives the server side of every socket opened by a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryAcceptor {
    rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryAcceptor {
    /// Wait for the next opened socket.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.rx.recv().await
    }

    /// Take an already-opened socket without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.rx.try_recv().ok()
    }
}

/// Server side of an in-memory socket.
#[derive(Debug)]
pub struct MemoryPeer {
    /// URL the client opened, token included.
    pub url: Url,
    commands: mpsc::Receiver<SocketCommand>,
    events: mpsc::Sender<SocketEvent>,
}

impl MemoryPeer {
    /// Wait for the next command from the client.
    pub async fn recv(&mut self) -> Option<SocketCommand> {
        self.commands.recv().await
    }

    /// Everything the client has sent so far, without waiting.
    pub fn drain_commands(&mut self) -> Vec<SocketCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.commands.try_recv() {
            out.push(cmd);
        }
        out
    }

    /// Text frames the client has sent so far, decoded as JSON.
    ///
    /// Close commands and non-JSON text are skipped.
    pub fn drain_frames(&mut self) -> Vec<Value> {
        self.drain_commands()
            .into_iter()
            .filter_map(|cmd| match cmd {
                SocketCommand::Text(text) => serde_json::from_str(&text).ok(),
                SocketCommand::Close { .. } => None,
            })
            .collect()
    }

    /// Wait for the next JSON text frame. `None` once the client closes.
    pub async fn next_frame(&mut self) -> Option<Value> {
        loop {
            match self.commands.recv().await? {
                SocketCommand::Text(text) => {
                    if let Ok(value) = serde_json::from_str(&text) {
                        return Some(value);
                    }
                }
                SocketCommand::Close { .. } => return None,
            }
        }
    }

    /// Deliver a raw text frame to the client.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.events.send(SocketEvent::Text(text.into())).await.is_ok()
    }

    /// Deliver a JSON frame to the client.
    pub async fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string()).await
    }

    /// Close from the server side with a close frame.
    pub async fn close(self, code: u16, reason: impl Into<String>) {
        let _ = self
            .events
            .send(SocketEvent::Closed {
                code: Some(code),
                reason: reason.into(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn url() -> Url {
        Url::parse("ws://memory.test/ws?token=t").unwrap()
    }

    #[tokio::test]
    async fn open_hands_peer_to_acceptor() {
        let (transport, mut acceptor) = MemoryTransport::new();
        let mut socket = transport.open(&url(), 8).await.unwrap();
        let mut peer = acceptor.accept().await.unwrap();
        assert_eq!(peer.url, url());

        socket
            .commands
            .try_send(SocketCommand::Text(r#"{"type":"ping"}"#.into()))
            .unwrap();
        assert_eq!(peer.next_frame().await.unwrap()["type"], "ping");

        assert!(peer.send_text("hello").await);
        assert_eq!(socket.events.recv().await, Some(SocketEvent::Text("hello".into())));
    }

    #[tokio::test]
    async fn refusals_are_counted_down() {
        let (transport, mut acceptor) = MemoryTransport::new();
        transport.refuse_next(2);

        assert_matches!(transport.open(&url(), 8).await, Err(TransportError::Connect { .. }));
        assert_matches!(transport.open(&url(), 8).await, Err(TransportError::Connect { .. }));
        assert!(transport.open(&url(), 8).await.is_ok());
        assert_eq!(transport.attempts(), 3);
        assert!(acceptor.try_accept().is_some());
        assert!(acceptor.try_accept().is_none());
    }

    #[tokio::test]
    async fn dropping_peer_ends_event_stream() {
        let (transport, mut acceptor) = MemoryTransport::new();
        let mut socket = transport.open(&url(), 8).await.unwrap();
        drop(acceptor.accept().await.unwrap());
        assert_eq!(socket.events.recv().await, None);
    }

    #[tokio::test]
    async fn close_sends_closed_event() {
        let (transport, mut acceptor) = MemoryTransport::new();
        let mut socket = transport.open(&url(), 8).await.unwrap();
        acceptor.accept().await.unwrap().close(4001, "kicked").await;
        assert_eq!(
            socket.events.recv().await,
            Some(SocketEvent::Closed {
                code: Some(4001),
                reason: "kicked".into()
            })
        );
    }

    #[tokio::test]
    async fn drain_frames_skips_close() {
        let (transport, mut acceptor) = MemoryTransport::new();
        let socket = transport.open(&url(), 8).await.unwrap();
        let mut peer = acceptor.accept().await.unwrap();
        socket
            .commands
            .try_send(SocketCommand::Text(r#"{"type":"a"}"#.into()))
            .unwrap();
        socket.commands.try_send(SocketCommand::close(1000, "bye")).unwrap();
        let frames = peer.drain_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "a");
    }

    #[tokio::test]
    async fn open_without_acceptor_fails() {
        let (transport, acceptor) = MemoryTransport::new();
        drop(acceptor);
        assert_matches!(transport.open(&url(), 8).await, Err(TransportError::Connect { .. }));
    }
}
