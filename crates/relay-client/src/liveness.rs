//! Heartbeat ping/pong liveness monitoring.
//!
//! Every inbound frame counts as proof of life. At each interval tick the
//! alive flag is checked and reset, and a `ping` is sent. After `max_missed`
//! consecutive silent intervals the socket is declared half-open.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Per-socket liveness flag, shared between the reader and the heartbeat.
#[derive(Debug)]
pub struct Liveness {
    alive: AtomicBool,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// A freshly opened socket counts as alive.
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
        }
    }

    /// Record inbound traffic.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if traffic arrived since the last check.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }
}

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stayed silent for `missed` consecutive intervals.
    TimedOut {
        /// Consecutive silent intervals observed.
        missed: u32,
    },
    /// The heartbeat was cancelled externally.
    Cancelled,
    /// The ping could not be handed to the socket; the connection is gone.
    Stopped,
}

/// Run the heartbeat for one socket.
///
/// The first tick fires one `interval` after start. `send_ping` returns
/// `false` once the socket it belongs to is no longer current. A
/// `max_missed` of `0` keeps pinging but never times out.
pub async fn run_heartbeat<F>(
    liveness: Arc<Liveness>,
    interval: Duration,
    max_missed: u32,
    mut send_ping: F,
    cancel: CancellationToken,
) -> HeartbeatResult
where
    F: FnMut() -> bool,
{
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            _ = ticker.tick() => {
                if liveness.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if max_missed > 0 && missed >= max_missed {
                        return HeartbeatResult::TimedOut { missed };
                    }
                }
                if !send_ping() {
                    return HeartbeatResult::Stopped;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn mark_alive_and_check() {
        let liveness = Liveness::new();
        assert!(liveness.check_alive());
        assert!(!liveness.check_alive());
        liveness.mark_alive();
        assert!(liveness.check_alive());
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let handle = tokio::spawn(async move {
            run_heartbeat(
                Arc::new(Liveness::new()),
                Duration::from_secs(100),
                3,
                || true,
                child,
            )
            .await
        });

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_after_max_missed() {
        let liveness = Arc::new(Liveness::new());
        let pings = Arc::new(AtomicU32::new(0));
        let counter = pings.clone();
        let start = Instant::now();

        let result = run_heartbeat(
            liveness,
            Duration::from_secs(30),
            3,
            move || {
                let _ = counter.fetch_add(1, Ordering::Relaxed);
                true
            },
            CancellationToken::new(),
        )
        .await;

        // Tick 1 consumes the open-time flag, ticks 2..4 are silent
        assert_eq!(result, HeartbeatResult::TimedOut { missed: 3 });
        assert_eq!(start.elapsed(), Duration::from_secs(120));
        assert_eq!(pings.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_keeps_connection_alive() {
        let liveness = Arc::new(Liveness::new());
        let probe = liveness.clone();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        // Every ping is answered immediately
        let handle = tokio::spawn(run_heartbeat(
            liveness,
            Duration::from_secs(10),
            2,
            move || {
                probe.mark_alive();
                true
            },
            cancel,
        ));

        time::sleep(Duration::from_secs(100)).await;
        assert!(!handle.is_finished());
        stop.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_missed_never_times_out() {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let handle = tokio::spawn(run_heartbeat(
            Arc::new(Liveness::new()),
            Duration::from_secs(1),
            0,
            || true,
            cancel,
        ));

        time::sleep(Duration::from_secs(60)).await;
        assert!(!handle.is_finished());
        stop.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ping_stops_heartbeat() {
        let result = run_heartbeat(
            Arc::new(Liveness::new()),
            Duration::from_secs(5),
            3,
            || false,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::Stopped);
    }
}
