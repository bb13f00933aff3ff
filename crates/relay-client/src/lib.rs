//! # relay-client
//!
//! A realtime connection manager that keeps one logical WebSocket channel
//! alive across network interruptions.
//!
//! - **Supervisor** ([`client`], [`supervisor`]): connect/close lifecycle and the
//!   reconnect state machine with `base * 1.5^n` backoff
//! - **Liveness** ([`liveness`]): periodic `ping` frames, `pong` replies to
//!   server probes, and half-open detection after missed beats
//! - **Offline queue** ([`queue`]): subscribe/unsubscribe calls issued while
//!   disconnected, flushed FIFO on the next open
//! - **Dispatcher** ([`dispatcher`]): per-type and wildcard listeners with
//!   per-handler failure isolation, plus request/response correlation
//! - **Transports** ([`transport`]): `tokio-tungstenite` for real sockets,
//!   an in-memory pair for tests
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_client::{ClientConfig, RealtimeClient, TokenStore};
//!
//! # async fn demo() {
//! let auth = Arc::new(TokenStore::with_token("secret"));
//! let client = RealtimeClient::with_websocket(ClientConfig::default(), auth);
//! let _listener = client.on("quota.updated", |frame| {
//!     println!("{}", frame.data);
//!     Ok(())
//! });
//! client.subscribe("room-42");
//! client.connect().await;
//! # }
//! ```

#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod liveness;
pub mod queue;
pub mod state;
pub mod subscriptions;
pub mod supervisor;
pub mod transport;

pub use auth::{AuthAction, AuthProvider, TokenStore, reconcile_auth, spawn_auth_watch};
pub use client::RealtimeClient;
pub use config::ClientConfig;
pub use dispatcher::{EventDispatcher, HandlerId, Listener};
pub use endpoint::Environment;
pub use queue::{OfflineQueue, Operation, PendingOperation};
pub use state::{ConnectionState, ConnectionStatus};
pub use transport::memory::{MemoryAcceptor, MemoryPeer, MemoryTransport};
pub use transport::ws::WsTransport;
pub use transport::{Socket, SocketCommand, SocketEvent, Transport};

pub use relay_core::errors::{HandlerError, HandlerResult, RequestError, TransportError};
pub use relay_core::frame::{EventFrame, OutboundFrame};
