//! Access tokens and the auth watcher.
//!
//! The client reads a token at every connect attempt through an
//! [`AuthProvider`]. [`spawn_auth_watch`] keeps the connection in step with
//! the auth state: it connects once a token appears and disconnects when it
//! goes away.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::RealtimeClient;
use crate::state::ConnectionState;

/// Source of access tokens.
pub trait AuthProvider: Send + Sync {
    /// Current token, if signed in.
    fn access_token(&self) -> Option<String>;

    /// Whether the user is signed in.
    fn is_authenticated(&self) -> bool {
        self.access_token().is_some_and(|t| !t.is_empty())
    }
}

/// In-process token holder.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<Option<String>>,
}

impl TokenStore {
    /// Signed-out store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Replace the token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Sign out.
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl AuthProvider for TokenStore {
    fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// What one reconciliation pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthAction {
    /// Nothing to do.
    None,
    /// Signed in while disconnected: connected.
    Connected,
    /// Signed in while disconnected, but the attempt did not open a socket.
    ConnectFailed,
    /// Signed out while connected or connecting: disconnected.
    Disconnected,
}

/// Bring the connection in line with the auth state once.
pub async fn reconcile_auth(client: &RealtimeClient) -> AuthAction {
    let authenticated = client.auth().is_authenticated();
    match (authenticated, client.state()) {
        (true, ConnectionState::Disconnected) => {
            debug!("authenticated while disconnected, connecting");
            client.connect().await;
            if client.is_connected() {
                AuthAction::Connected
            } else {
                AuthAction::ConnectFailed
            }
        }
        (false, ConnectionState::Open | ConnectionState::Connecting) => {
            info!("signed out, disconnecting");
            client.disconnect();
            AuthAction::Disconnected
        }
        _ => AuthAction::None,
    }
}

/// Reconcile every `interval` until `cancel` fires.
///
/// The task holds a client handle, so the connection stays alive until the
/// watcher is cancelled.
pub fn spawn_auth_watch(
    client: RealtimeClient,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("auth watcher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let _ = reconcile_auth(&client).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_store_set_and_clear() {
        let store = TokenStore::new();
        assert!(!store.is_authenticated());
        store.set("abc");
        assert_eq!(store.access_token().as_deref(), Some("abc"));
        assert!(store.is_authenticated());
        store.clear();
        assert!(store.access_token().is_none());
    }

    #[test]
    fn empty_token_is_not_authenticated() {
        let store = TokenStore::with_token("");
        assert!(!store.is_authenticated());
    }
}
