//! `tokio-tungstenite` transport.
//!
//! `wss://` endpoints go through rustls with the webpki root set. The ring
//! crypto provider is installed process-wide on first use.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use relay_core::errors::TransportError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use super::{Socket, SocketCommand, SocketEvent, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Real WebSocket transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create a transport.
    pub fn new() -> Self {
        Self
    }
}

fn install_crypto_provider() {
    // Err means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &Url, buffer: usize) -> Result<Socket, TransportError> {
        if url.scheme() == "wss" {
            install_crypto_provider();
        }
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::connect(e.to_string()))?;
        debug!(status = %response.status(), host = url.host_str().unwrap_or_default(), "websocket handshake complete");

        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let _ = tokio::spawn(pump(stream, cmd_rx, event_tx));

        Ok(Socket {
            commands: cmd_tx,
            events: event_rx,
        })
    }
}

/// Shuttle frames between the socket and the client's channels until either
/// side closes, then report exactly one [`SocketEvent::Closed`].
async fn pump(
    stream: WsStream,
    mut commands: mpsc::Receiver<SocketCommand>,
    events: mpsc::Sender<SocketEvent>,
) {
    let (mut sink, mut source) = stream.split();

    let closed = loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SocketCommand::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(error = %e, "websocket write failed");
                        break SocketEvent::Closed { code: None, reason: e.to_string() };
                    }
                }
                Some(SocketCommand::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    break SocketEvent::Closed { code: Some(code), reason };
                }
                None => {
                    let _ = sink.close().await;
                    break SocketEvent::Closed { code: None, reason: "client released socket".into() };
                }
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if events.send(SocketEvent::Text(text.as_str().to_owned())).await.is_err() {
                        let _ = sink.close().await;
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if events.send(SocketEvent::Text(text)).await.is_err() {
                            let _ = sink.close().await;
                            return;
                        }
                    }
                    Err(_) => debug!(len = bytes.len(), "dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()))
                        .unwrap_or_default();
                    break SocketEvent::Closed { code, reason };
                }
                // Protocol-level ping/pong is answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    break SocketEvent::Closed { code: None, reason: e.to_string() };
                }
                None => break SocketEvent::Closed { code: None, reason: "stream ended".into() },
            },
        }
    };

    let _ = events.send(closed).await;
}
