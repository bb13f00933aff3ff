//! The realtime client.
//!
//! [`RealtimeClient`] is a cheap-to-clone handle over shared state. Three
//! kinds of background task act on that state, each holding only a weak
//! reference so dropping the last handle shuts everything down:
//!
//! - a **reader** per socket, processing inbound events in arrival order
//! - a **heartbeat** per open socket (see [`crate::liveness`])
//! - at most one **reconnect timer**
//!
//! All state lives in one [`Supervisor`] behind a `parking_lot` mutex. The
//! lock is never held across an `.await` or while user handlers run.

use std::sync::{Arc, Weak};
use std::time::Duration;

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use relay_core::constants::{LIVENESS_TIMEOUT_CLOSURE, NORMAL_CLOSURE};
use relay_core::errors::{HandlerResult, RequestError, TransportError};
use relay_core::frame::{ControlFrame, EventFrame, OutboundFrame};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::config::ClientConfig;
use crate::dispatcher::{EventDispatcher, HandlerId, Listener};
use crate::endpoint::{self, Environment};
use crate::liveness::{HeartbeatResult, Liveness, run_heartbeat};
use crate::queue::PendingOperation;
use crate::state::{ConnectionState, ConnectionStatus};
use crate::supervisor::{CloseOutcome, Supervisor};
use crate::transport::ws::WsTransport;
use crate::transport::{Socket, SocketCommand, SocketEvent, Transport};

/// Handle to a managed realtime connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

struct Inner {
    me: Weak<Inner>,
    config: ClientConfig,
    environment: RwLock<Environment>,
    auth: Arc<dyn AuthProvider>,
    transport: Arc<dyn Transport>,
    core: Mutex<Supervisor>,
    dispatcher: EventDispatcher,
    status: watch::Sender<ConnectionStatus>,
}

impl RealtimeClient {
    /// Create a client over an arbitrary transport. Nothing connects until
    /// [`connect`](Self::connect) is called.
    pub fn new(
        config: ClientConfig,
        auth: Arc<dyn AuthProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            environment: RwLock::new(config.environment.clone()),
            config,
            auth,
            transport,
            core: Mutex::new(Supervisor::new()),
            dispatcher: EventDispatcher::new(),
            status,
        });
        Self { inner }
    }

    /// Create a client over real WebSockets.
    pub fn with_websocket(config: ClientConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self::new(config, auth, Arc::new(WsTransport::new()))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Open the connection.
    ///
    /// No-op while open or connecting, and when the auth provider has no
    /// token. Supersedes a pending reconnect timer. Returns once the attempt
    /// has either opened the socket or failed (in which case a reconnect is
    /// scheduled).
    pub async fn connect(&self) {
        self.inner.connect().await;
    }

    /// Close the connection and stop all automatic reconnection.
    ///
    /// Cancels the reconnect timer and the heartbeat, fails pending
    /// requests, and sends a normal close. Idempotent. Desired
    /// subscriptions and the offline queue are kept for the next connect.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Replace the host environment used to derive the endpoint. Takes
    /// effect on the next connect attempt.
    pub fn set_environment(&self, environment: Environment) {
        *self.inner.environment.write() = environment;
    }

    // ── Outbound ────────────────────────────────────────────────────────

    /// Send an application frame. Returns `false` (and sends nothing) unless
    /// the socket is open. Application frames are never queued.
    pub fn send(&self, event_type: &str, data: Value) -> bool {
        self.inner.core.lock().send(&OutboundFrame::app(event_type, data))
    }

    /// Subscribe to a channel, now if open, otherwise on the next open.
    ///
    /// The channel is also resubscribed after every reconnect until
    /// [`unsubscribe`](Self::unsubscribe) is called.
    pub fn subscribe(&self, channel: &str) {
        let mut core = self.inner.core.lock();
        core.subscribe(channel);
        debug!(channel, state = %core.state, "subscribe");
    }

    /// Unsubscribe from a channel, now if open, otherwise on the next open.
    pub fn unsubscribe(&self, channel: &str) {
        let mut core = self.inner.core.lock();
        core.unsubscribe(channel);
        debug!(channel, state = %core.state, "unsubscribe");
    }

    /// Send a request and wait for the frame echoing its `request_id`.
    ///
    /// The response is not delivered to listeners. `timeout` defaults to
    /// the configured request timeout.
    pub async fn request(
        &self,
        event_type: &str,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<EventFrame, RequestError> {
        let timeout = timeout.unwrap_or(self.inner.config.request_timeout);
        let request_id = Uuid::now_v7().to_string();
        let text = OutboundFrame::app(event_type, data)
            .with_request_id(request_id.clone())
            .encode()?;

        let response = self.inner.dispatcher.register_pending(&request_id);
        let sent = self.inner.core.lock().send_text(text);
        if !sent {
            self.inner.dispatcher.cancel_pending(&request_id);
            return Err(RequestError::NotConnected);
        }

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(RequestError::Disconnected),
            Err(_) => {
                self.inner.dispatcher.cancel_pending(&request_id);
                Err(RequestError::Timeout {
                    request_type: event_type.to_owned(),
                    timeout_ms: millis(timeout),
                })
            }
        }
    }

    // ── Listeners ───────────────────────────────────────────────────────

    /// Register a handler for `event_type`; `"*"` receives every frame.
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> Listener
    where
        F: Fn(&EventFrame) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event_type, handler)
    }

    /// Register a handler that runs for the first matching frame only.
    pub fn once<F>(&self, event_type: impl Into<String>, handler: F) -> Listener
    where
        F: Fn(&EventFrame) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.dispatcher.once(event_type, handler)
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, event_type: &str, id: HandlerId) -> bool {
        self.inner.dispatcher.off(event_type, id)
    }

    // ── Introspection ───────────────────────────────────────────────────

    /// True only while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.core.lock().state == ConnectionState::Open
    }

    /// Lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    /// Server-assigned id of the current socket, if announced.
    pub fn connection_id(&self) -> Option<String> {
        self.inner.core.lock().status().connection_id
    }

    /// Current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.core.lock().status()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Desired channels, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.core.lock().subscriptions.to_vec()
    }

    /// Operations waiting for the next open, oldest first.
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.inner.core.lock().queue.snapshot()
    }

    /// Whether an automatic reconnect is scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.inner.core.lock().timers.reconnect_pending()
    }

    /// The auth provider this client was built with.
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.inner.auth
    }

    /// Handlers registered for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner.dispatcher.listener_count(event_type)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor wiring
// ─────────────────────────────────────────────────────────────────────────────

impl Inner {
    fn publish(&self, core: &Supervisor) {
        let _ = self.status.send_replace(core.status());
    }

    async fn connect(&self) {
        {
            let core = self.core.lock();
            if matches!(core.state, ConnectionState::Open | ConnectionState::Connecting) {
                debug!(state = %core.state, "connect ignored");
                return;
            }
        }

        let token = self.auth.access_token().filter(|t| !t.is_empty());
        let Some(token) = token else {
            info!("no access token, not connecting");
            return;
        };

        let generation = {
            let mut core = self.core.lock();
            let Some(generation) = core.begin_attempt() else {
                return;
            };
            self.publish(&core);
            generation
        };

        let url = {
            let environment = self.environment.read();
            endpoint::connect_url(&self.config.endpoint, &environment, &token)
        };
        let result = match url {
            Ok(url) => {
                debug!(generation, host = url.host_str().unwrap_or_default(), "opening socket");
                self.open_socket(&url).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(socket) => self.on_open(generation, socket),
            Err(e) => self.on_attempt_failed(generation, &e),
        }
    }

    async fn open_socket(&self, url: &Url) -> Result<Socket, TransportError> {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, self.transport.open(url, self.config.outbound_buffer)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: millis(timeout),
            }),
        }
    }

    fn on_open(&self, generation: u64, socket: Socket) {
        let Socket { commands, events } = socket;
        let mut core = self.core.lock();
        if !core.is_pending_attempt(generation) {
            debug!(generation, "discarding socket from superseded attempt");
            let _ = commands.try_send(SocketCommand::close(NORMAL_CLOSURE, "superseded"));
            return;
        }

        let liveness = Arc::new(Liveness::new());
        core.mark_open(commands, liveness.clone());
        counter!("relay_connections_opened_total").increment(1);
        info!(generation, "connection open");

        let _ = tokio::spawn(read_events(self.me.clone(), generation, events));
        self.start_heartbeat(&mut core, generation, liveness);

        let (flushed, resubscribed) = core.reconcile();
        debug!(flushed, resubscribed, "offline queue flushed, subscriptions restored");
        self.publish(&core);
    }

    fn on_attempt_failed(&self, generation: u64, error: &TransportError) {
        let mut core = self.core.lock();
        if !core.is_pending_attempt(generation) {
            debug!(generation, error = %error, "superseded attempt failed");
            return;
        }
        warn!(generation, error = %error, "connection attempt failed");
        core.mark_attempt_failed();
        self.schedule_reconnect(&mut core);
        self.publish(&core);
    }

    fn schedule_reconnect(&self, core: &mut Supervisor) {
        let attempt = core.reconnect_attempts;
        let Some(delay) = self.config.reconnect.next_delay(attempt) else {
            warn!(
                attempts = attempt,
                "reconnect attempts exhausted, waiting for an explicit connect"
            );
            return;
        };
        core.reconnect_attempts += 1;

        let ticket = core.timers.next_ticket();
        let me = self.me.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = me.upgrade() else {
                return;
            };
            let claimed = inner.core.lock().timers.take_reconnect(ticket);
            if claimed {
                inner.connect().await;
            }
        });
        core.timers.set_reconnect(ticket, handle);

        counter!("relay_reconnects_scheduled_total").increment(1);
        info!(
            attempt = attempt + 1,
            delay_ms = millis(delay),
            "reconnect scheduled"
        );
    }

    fn start_heartbeat(&self, core: &mut Supervisor, generation: u64, liveness: Arc<Liveness>) {
        let cancel = CancellationToken::new();
        core.timers.set_heartbeat(cancel.clone());

        let interval = self.config.heartbeat_interval;
        let max_missed = self.config.max_missed_heartbeats;
        let me = self.me.clone();
        let _ = tokio::spawn(async move {
            let pinger = me.clone();
            let send_ping = move || pinger.upgrade().is_some_and(|inner| inner.send_ping(generation));
            let result = run_heartbeat(liveness, interval, max_missed, send_ping, cancel).await;
            if let HeartbeatResult::TimedOut { missed } = result {
                if let Some(inner) = me.upgrade() {
                    inner.on_liveness_timeout(generation, missed);
                }
            }
        });
    }

    /// Returns `false` once `generation` is no longer the open socket.
    fn send_ping(&self, generation: u64) -> bool {
        let core = self.core.lock();
        if !core.is_current_open(generation) {
            return false;
        }
        let _ = core.send(&OutboundFrame::ping());
        true
    }

    fn on_liveness_timeout(&self, generation: u64, missed: u32) {
        {
            let mut core = self.core.lock();
            if !core.is_current_open(generation) {
                return;
            }
            warn!(generation, missed, "no traffic from server, forcing reconnect");
            counter!("relay_liveness_timeouts_total").increment(1);
            core.abandon_socket(LIVENESS_TIMEOUT_CLOSURE, "liveness timeout");
            self.schedule_reconnect(&mut core);
            self.publish(&core);
        }
        let _ = self.dispatcher.fail_pending();
    }

    fn disconnect(&self) {
        let changed = {
            let mut core = self.core.lock();
            let changed = core.request_disconnect(NORMAL_CLOSURE, "client disconnect");
            if changed {
                info!(state = %core.state, "disconnect requested");
                self.publish(&core);
            }
            changed
        };
        if changed {
            let _ = self.dispatcher.fail_pending();
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    fn handle_text(&self, generation: u64, text: &str) {
        let frame = match EventFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                counter!("relay_frames_dropped_total", "reason" => "malformed").increment(1);
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        {
            let mut core = self.core.lock();
            if !core.is_current_open(generation) {
                debug!(generation, event_type = %frame.event_type, "frame from inactive socket ignored");
                return;
            }
            core.mark_alive();

            match frame.control() {
                Some(ControlFrame::Connected { connection_id }) => {
                    info!(connection_id = %connection_id, "server assigned connection id");
                    core.connection_id = connection_id;
                    self.publish(&core);
                    return;
                }
                Some(ControlFrame::Pong) => return,
                Some(ControlFrame::Ping) => {
                    if !core.send(&OutboundFrame::pong()) {
                        debug!("pong not sent");
                    }
                    return;
                }
                None => {}
            }
        }

        if self.dispatcher.resolve_pending(&frame) {
            return;
        }
        let _ = self.dispatcher.dispatch(&frame);
    }

    fn handle_closed(&self, generation: u64, code: Option<u16>, reason: &str) {
        let outcome = {
            let mut core = self.core.lock();
            let outcome = core.handle_closed(generation);
            match outcome {
                CloseOutcome::Stale => {
                    debug!(generation, "close of inactive socket ignored");
                }
                CloseOutcome::Requested => {
                    info!(generation, "connection closed");
                    self.publish(&core);
                }
                CloseOutcome::Dropped => {
                    warn!(generation, code, reason, "connection lost");
                    self.schedule_reconnect(&mut core);
                    self.publish(&core);
                }
            }
            outcome
        };
        if outcome != CloseOutcome::Stale {
            let _ = self.dispatcher.fail_pending();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.core.get_mut().timers.clear();
    }
}

/// Process one socket's events in arrival order.
async fn read_events(me: Weak<Inner>, generation: u64, mut events: mpsc::Receiver<SocketEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = me.upgrade() else {
            return;
        };
        match event {
            SocketEvent::Text(text) => inner.handle_text(generation, &text),
            SocketEvent::Closed { code, reason } => {
                inner.handle_closed(generation, code, &reason);
                return;
            }
        }
    }
    if let Some(inner) = me.upgrade() {
        inner.handle_closed(generation, None, "transport ended");
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
