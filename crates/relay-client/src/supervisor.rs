//! Connection supervisor state.
//!
//! [`Supervisor`] is the single mutable record behind the client's lock:
//! lifecycle state, the current socket, desired subscriptions, the offline
//! queue, and the two timers. Its methods are synchronous transitions; the
//! client wires them to tasks and I/O.
//!
//! Every connect attempt gets a new `generation`. Socket events, heartbeat
//! timeouts, and completed attempts carry the generation they belong to and
//! are ignored once it is no longer current, so a slow event from an
//! abandoned socket can never tear down its successor.

use std::sync::Arc;

use metrics::counter;
use relay_core::frame::OutboundFrame;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::liveness::Liveness;
use crate::queue::{OfflineQueue, PendingOperation};
use crate::state::{ConnectionState, ConnectionStatus};
use crate::subscriptions::SubscriptionSet;
use crate::transport::SocketCommand;

/// What a socket close means for the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The close belongs to an abandoned socket.
    Stale,
    /// The close completes an explicit disconnect.
    Requested,
    /// The connection dropped and should be re-established.
    Dropped,
}

/// Pending reconnect and heartbeat.
#[derive(Debug, Default)]
pub struct Timers {
    reconnect: Option<(u64, JoinHandle<()>)>,
    heartbeat: Option<CancellationToken>,
    next_ticket: u64,
}

impl Timers {
    /// Allocate a ticket identifying the next reconnect timer.
    pub fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Install a reconnect timer, aborting any previous one.
    pub fn set_reconnect(&mut self, ticket: u64, handle: JoinHandle<()>) {
        self.clear_reconnect();
        self.reconnect = Some((ticket, handle));
    }

    /// Claim the timer when it fires.
    ///
    /// Returns `false` if the timer was cleared or replaced meanwhile. The
    /// handle is released without aborting, since the caller is that task.
    pub fn take_reconnect(&mut self, ticket: u64) -> bool {
        match &self.reconnect {
            Some((current, _)) if *current == ticket => {
                self.reconnect = None;
                true
            }
            _ => false,
        }
    }

    /// Abort the pending reconnect, if any.
    pub fn clear_reconnect(&mut self) {
        if let Some((_, handle)) = self.reconnect.take() {
            handle.abort();
        }
    }

    /// Whether a reconnect is scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Install a heartbeat, cancelling any previous one.
    pub fn set_heartbeat(&mut self, cancel: CancellationToken) {
        self.stop_heartbeat();
        self.heartbeat = Some(cancel);
    }

    /// Cancel the heartbeat, if running.
    pub fn stop_heartbeat(&mut self) {
        if let Some(cancel) = self.heartbeat.take() {
            cancel.cancel();
        }
    }

    /// Stop both timers.
    pub fn clear(&mut self) {
        self.clear_reconnect();
        self.stop_heartbeat();
    }
}

/// Mutable connection record.
#[derive(Debug, Default)]
pub struct Supervisor {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Server-assigned id; empty until a `connected` frame arrives.
    pub connection_id: String,
    /// Reconnects scheduled since the last successful open.
    pub reconnect_attempts: u32,
    /// Current attempt; bumped whenever the current socket is abandoned.
    pub generation: u64,
    /// Desired channels.
    pub subscriptions: SubscriptionSet,
    /// Subscription changes waiting for an open socket.
    pub queue: OfflineQueue,
    /// Reconnect and heartbeat timers.
    pub timers: Timers,
    socket: Option<mpsc::Sender<SocketCommand>>,
    liveness: Option<Arc<Liveness>>,
}

impl Supervisor {
    /// Fresh, disconnected record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observable snapshot.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            connection_id: (!self.connection_id.is_empty()).then(|| self.connection_id.clone()),
            reconnect_attempts: self.reconnect_attempts,
        }
    }

    /// Whether `generation` is the attempt currently being opened.
    pub fn is_pending_attempt(&self, generation: u64) -> bool {
        self.state == ConnectionState::Connecting && self.generation == generation
    }

    /// Whether `generation` is the socket currently open.
    pub fn is_current_open(&self, generation: u64) -> bool {
        self.state == ConnectionState::Open && self.generation == generation
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// Start a connect attempt.
    ///
    /// Returns `None` (no-op) while already open or connecting. Otherwise
    /// supersedes any pending reconnect timer and any socket still closing,
    /// and returns the new generation.
    pub fn begin_attempt(&mut self) -> Option<u64> {
        if matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            return None;
        }
        self.timers.clear_reconnect();
        self.release_socket();
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        Some(self.generation)
    }

    /// The attempt succeeded: adopt the socket.
    pub fn mark_open(&mut self, commands: mpsc::Sender<SocketCommand>, liveness: Arc<Liveness>) {
        self.state = ConnectionState::Open;
        self.reconnect_attempts = 0;
        self.connection_id.clear();
        self.socket = Some(commands);
        self.liveness = Some(liveness);
    }

    /// The attempt failed before a socket opened.
    pub fn mark_attempt_failed(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.release_socket();
    }

    /// The transport reported the current socket closed.
    pub fn handle_closed(&mut self, generation: u64) -> CloseOutcome {
        if self.generation != generation {
            return CloseOutcome::Stale;
        }
        let outcome = match self.state {
            ConnectionState::Open => CloseOutcome::Dropped,
            ConnectionState::Closing => CloseOutcome::Requested,
            ConnectionState::Connecting | ConnectionState::Disconnected => return CloseOutcome::Stale,
        };
        self.reset_disconnected();
        outcome
    }

    /// Abandon the open socket (liveness timeout). Sends a best-effort close
    /// and bumps the generation so its late events are ignored.
    pub fn abandon_socket(&mut self, code: u16, reason: &str) {
        let _ = self.close_socket(code, reason);
        self.reset_disconnected();
        self.generation += 1;
    }

    /// Explicit disconnect.
    ///
    /// Stops both timers. From `Open` the socket is asked to close and the
    /// state becomes `Closing` until the transport confirms; anything else
    /// becomes `Disconnected` at once. Returns `true` if the state changed.
    pub fn request_disconnect(&mut self, code: u16, reason: &str) -> bool {
        self.timers.clear();
        match self.state {
            ConnectionState::Open => {
                if self.close_socket(code, reason) {
                    self.state = ConnectionState::Closing;
                    self.connection_id.clear();
                    self.liveness = None;
                } else {
                    self.reset_disconnected();
                    self.generation += 1;
                }
                true
            }
            ConnectionState::Connecting => {
                // The in-flight attempt is discarded when it completes
                self.generation += 1;
                self.state = ConnectionState::Disconnected;
                true
            }
            ConnectionState::Closing | ConnectionState::Disconnected => false,
        }
    }

    fn reset_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.connection_id.clear();
        self.release_socket();
        self.timers.stop_heartbeat();
    }

    fn release_socket(&mut self) {
        self.socket = None;
        self.liveness = None;
    }

    // ── Liveness ────────────────────────────────────────────────────────

    /// Record inbound traffic on the current socket.
    pub fn mark_alive(&self) {
        if let Some(liveness) = &self.liveness {
            liveness.mark_alive();
        }
    }

    // ── Outbound ────────────────────────────────────────────────────────

    /// Send a frame on the open socket. Returns `false` when not open, when
    /// the frame cannot be encoded, or when the outbound buffer is full.
    pub fn send(&self, frame: &OutboundFrame) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        match frame.encode() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!(event_type = %frame.event_type, error = %e, "failed to encode frame");
                false
            }
        }
    }

    /// Send pre-encoded text on the open socket.
    pub fn send_text(&self, text: String) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        let Some(socket) = &self.socket else {
            return false;
        };
        match socket.try_send(SocketCommand::Text(text)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                counter!("relay_frames_dropped_total", "reason" => "full").increment(1);
                warn!("outbound buffer full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                counter!("relay_frames_dropped_total", "reason" => "closed").increment(1);
                debug!("socket already closed, frame dropped");
                false
            }
        }
    }

    fn close_socket(&mut self, code: u16, reason: &str) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.try_send(SocketCommand::close(code, reason)).is_ok())
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Record a subscription; send it now if open, queue it otherwise.
    pub fn subscribe(&mut self, channel: &str) {
        let _ = self.subscriptions.insert(channel);
        if self.state == ConnectionState::Open {
            if !self.send(&OutboundFrame::subscribe(channel)) {
                warn!(channel, "subscribe frame not sent");
            }
        } else {
            self.queue.push(PendingOperation::subscribe(channel));
        }
    }

    /// Drop a subscription; send it now if open, queue it otherwise.
    pub fn unsubscribe(&mut self, channel: &str) {
        let _ = self.subscriptions.remove(channel);
        if self.state == ConnectionState::Open {
            if !self.send(&OutboundFrame::unsubscribe(channel)) {
                warn!(channel, "unsubscribe frame not sent");
            }
        } else {
            self.queue.push(PendingOperation::unsubscribe(channel));
        }
    }

    /// After open: flush the offline queue FIFO, then send `subscribe` for
    /// every desired channel.
    ///
    /// Queued operations that fail to send are dropped, not re-queued.
    /// Returns `(flushed, resubscribed)` counts of frames actually sent.
    pub fn reconcile(&mut self) -> (usize, usize) {
        let mut flushed = 0;
        for op in self.queue.drain() {
            if self.send(&op.to_frame()) {
                flushed += 1;
            } else {
                warn!(operation = %op, "queued operation dropped");
            }
        }

        let mut resubscribed = 0;
        for channel in self.subscriptions.iter() {
            if self.send(&OutboundFrame::subscribe(channel)) {
                resubscribed += 1;
            } else {
                warn!(channel, "resubscribe frame not sent");
            }
        }
        (flushed, resubscribed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::Value;

    fn open(sup: &mut Supervisor) -> (u64, mpsc::Receiver<SocketCommand>) {
        let generation = sup.begin_attempt().unwrap();
        let (tx, rx) = mpsc::channel(16);
        sup.mark_open(tx, Arc::new(Liveness::new()));
        (generation, rx)
    }

    fn sent(rx: &mut mpsc::Receiver<SocketCommand>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let SocketCommand::Text(text) = cmd {
                out.push(serde_json::from_str(&text).unwrap());
            }
        }
        out
    }

    #[test]
    fn begin_attempt_is_noop_when_connecting_or_open() {
        let mut sup = Supervisor::new();
        assert_eq!(sup.begin_attempt(), Some(1));
        assert_eq!(sup.begin_attempt(), None);
        let (tx, _rx) = mpsc::channel(1);
        sup.mark_open(tx, Arc::new(Liveness::new()));
        assert_eq!(sup.begin_attempt(), None);
        assert_eq!(sup.generation, 1);
    }

    #[test]
    fn mark_open_resets_attempts() {
        let mut sup = Supervisor::new();
        sup.reconnect_attempts = 3;
        let _ = open(&mut sup);
        assert_eq!(sup.reconnect_attempts, 0);
        assert!(sup.status().is_connected());
    }

    #[test]
    fn send_refused_unless_open() {
        let sup = Supervisor::new();
        assert!(!sup.send(&OutboundFrame::ping()));
    }

    #[test]
    fn send_reports_full_buffer() {
        let mut sup = Supervisor::new();
        let _ = sup.begin_attempt();
        let (tx, _rx) = mpsc::channel(1);
        sup.mark_open(tx, Arc::new(Liveness::new()));
        assert!(sup.send(&OutboundFrame::ping()));
        assert!(!sup.send(&OutboundFrame::ping()));
    }

    #[test]
    fn offline_subscribe_is_queued_and_recorded() {
        let mut sup = Supervisor::new();
        sup.subscribe("room-42");
        assert!(sup.subscriptions.contains("room-42"));
        assert_eq!(sup.queue.snapshot(), vec![PendingOperation::subscribe("room-42")]);
    }

    #[test]
    fn offline_unsubscribe_removes_and_queues() {
        let mut sup = Supervisor::new();
        sup.subscribe("room-42");
        sup.unsubscribe("room-42");
        assert!(sup.subscriptions.is_empty());
        assert_eq!(sup.queue.len(), 2);
    }

    #[test]
    fn reconcile_flushes_queue_then_resubscribes() {
        let mut sup = Supervisor::new();
        sup.subscribe("a");
        sup.subscribe("b");
        sup.unsubscribe("b");
        let (_, mut rx) = open(&mut sup);

        assert_eq!(sup.reconcile(), (3, 1));
        let frames = sent(&mut rx);
        let summary: Vec<(String, String)> = frames
            .iter()
            .map(|f| {
                (
                    f["type"].as_str().unwrap().to_owned(),
                    f["data"]["channel"].as_str().unwrap().to_owned(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("subscribe".into(), "a".into()),
                ("subscribe".into(), "b".into()),
                ("unsubscribe".into(), "b".into()),
                ("subscribe".into(), "a".into()),
            ]
        );
        assert!(sup.queue.is_empty());
    }

    #[test]
    fn reconcile_drops_unsendable_operations() {
        let mut sup = Supervisor::new();
        sup.subscribe("a");
        sup.subscribe("b");
        let _ = sup.begin_attempt();
        let (tx, _rx) = mpsc::channel(1);
        sup.mark_open(tx, Arc::new(Liveness::new()));

        let (flushed, resubscribed) = sup.reconcile();
        assert_eq!(flushed, 1);
        assert_eq!(resubscribed, 0);
        assert!(sup.queue.is_empty());
    }

    #[test]
    fn drop_while_open_requests_reconnect() {
        let mut sup = Supervisor::new();
        let (generation, _rx) = open(&mut sup);
        sup.connection_id = "c-1".into();
        assert_eq!(sup.handle_closed(generation), CloseOutcome::Dropped);
        assert_eq!(sup.state, ConnectionState::Disconnected);
        assert!(sup.status().connection_id.is_none());
    }

    #[test]
    fn stale_close_is_ignored() {
        let mut sup = Supervisor::new();
        let (generation, _rx) = open(&mut sup);
        assert_eq!(sup.handle_closed(generation - 1), CloseOutcome::Stale);
        assert_eq!(sup.state, ConnectionState::Open);
    }

    #[test]
    fn disconnect_from_open_goes_through_closing() {
        let mut sup = Supervisor::new();
        let (generation, mut rx) = open(&mut sup);

        assert!(sup.request_disconnect(1000, "bye"));
        assert_eq!(sup.state, ConnectionState::Closing);
        assert_matches!(rx.try_recv(), Ok(SocketCommand::Close { code: 1000, .. }));

        assert_eq!(sup.handle_closed(generation), CloseOutcome::Requested);
        assert_eq!(sup.state, ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut sup = Supervisor::new();
        assert!(!sup.request_disconnect(1000, "bye"));
        assert!(!sup.request_disconnect(1000, "bye"));
        assert_eq!(sup.state, ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_while_connecting_invalidates_attempt() {
        let mut sup = Supervisor::new();
        let generation = sup.begin_attempt().unwrap();
        assert!(sup.request_disconnect(1000, "bye"));
        assert!(!sup.is_pending_attempt(generation));
        assert_eq!(sup.state, ConnectionState::Disconnected);
    }

    #[test]
    fn connect_during_closing_abandons_old_socket() {
        let mut sup = Supervisor::new();
        let (old, _rx) = open(&mut sup);
        let _ = sup.request_disconnect(1000, "bye");

        let next = sup.begin_attempt().unwrap();
        assert!(next > old);
        assert_eq!(sup.handle_closed(old), CloseOutcome::Stale);
        assert_eq!(sup.state, ConnectionState::Connecting);
    }

    #[test]
    fn abandon_socket_bumps_generation() {
        let mut sup = Supervisor::new();
        let (generation, mut rx) = open(&mut sup);
        sup.abandon_socket(4000, "liveness timeout");
        assert_eq!(sup.state, ConnectionState::Disconnected);
        assert_eq!(sup.handle_closed(generation), CloseOutcome::Stale);
        assert_matches!(rx.try_recv(), Ok(SocketCommand::Close { code: 4000, .. }));
    }

    #[test]
    fn take_reconnect_checks_ticket() {
        let mut timers = Timers::default();
        let first = timers.next_ticket();
        let second = timers.next_ticket();
        assert_ne!(first, second);
        assert!(!timers.take_reconnect(first));
        assert!(!timers.reconnect_pending());
    }

    #[test]
    fn heartbeat_replacement_cancels_previous() {
        let mut timers = Timers::default();
        let first = CancellationToken::new();
        timers.set_heartbeat(first.clone());
        let second = CancellationToken::new();
        timers.set_heartbeat(second.clone());
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        timers.clear();
        assert!(second.is_cancelled());
    }
}
