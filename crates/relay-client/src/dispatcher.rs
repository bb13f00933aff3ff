//! Event dispatch to registered listeners.
//!
//! Handlers are keyed by frame type; the `*` key receives every frame after
//! the type-specific handlers. Each handler runs in isolation: an `Err` or a
//! panic is logged and counted, and the remaining handlers still run.
//!
//! The registry lock is only held to snapshot the handler list, so handlers
//! may register or remove listeners (including themselves) while running.
//!
//! The dispatcher also owns the table of in-flight correlated requests.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use relay_core::errors::HandlerResult;
use relay_core::frame::{EventFrame, WILDCARD};
use tokio::sync::oneshot;
use tracing::{error, warn};

type HandlerFn = dyn Fn(&EventFrame) -> HandlerResult + Send + Sync;
type Registry = RwLock<HashMap<String, Vec<Registration>>>;

/// Identifies one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

struct Registration {
    id: HandlerId,
    handler: Arc<HandlerFn>,
}

/// Handle to a registered handler.
///
/// Dropping the handle does **not** remove the handler; call
/// [`Listener::remove`] or [`EventDispatcher::off`].
#[derive(Clone, Debug)]
pub struct Listener {
    event_type: String,
    id: HandlerId,
    registry: Weak<Registry>,
}

impl Listener {
    /// Handler id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Event type the handler is registered for.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Unregister the handler. Returns `false` if it was already gone.
    pub fn remove(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| remove_handler(&registry, &self.event_type, self.id))
    }
}

fn remove_handler(registry: &Registry, event_type: &str, id: HandlerId) -> bool {
    let mut map = registry.write();
    let Some(handlers) = map.get_mut(event_type) else {
        return false;
    };
    let before = handlers.len();
    handlers.retain(|r| r.id != id);
    let removed = handlers.len() != before;
    if handlers.is_empty() {
        let _ = map.remove(event_type);
    }
    removed
}

/// Routes inbound frames to listeners and correlated requests.
pub struct EventDispatcher {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<EventFrame>>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.registry.read().len())
            .field("pending_requests", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Empty dispatcher.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, event_type: String, id: HandlerId, handler: Arc<HandlerFn>) -> Listener {
        self.registry
            .write()
            .entry(event_type.clone())
            .or_default()
            .push(Registration { id, handler });
        Listener {
            event_type,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register a handler for `event_type` (`"*"` for every frame).
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> Listener
    where
        F: Fn(&EventFrame) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.insert(event_type.into(), id, Arc::new(handler))
    }

    /// Register a handler that runs at most once, then removes itself.
    pub fn once<F>(&self, event_type: impl Into<String>, handler: F) -> Listener
    where
        F: Fn(&EventFrame) -> HandlerResult + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = self.allocate_id();
        let fired = AtomicBool::new(false);
        let registry = Arc::downgrade(&self.registry);
        let key = event_type.clone();

        let wrapped = move |frame: &EventFrame| -> HandlerResult {
            // Concurrent dispatches may both hold a snapshot containing us
            if fired.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            if let Some(registry) = registry.upgrade() {
                let _ = remove_handler(&registry, &key, id);
            }
            handler(frame)
        };
        self.insert(event_type, id, Arc::new(wrapped))
    }

    /// Remove one handler. Returns `false` if it was not registered.
    pub fn off(&self, event_type: &str, id: HandlerId) -> bool {
        remove_handler(&self.registry, event_type, id)
    }

    /// Handlers currently registered for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.registry.read().get(event_type).map_or(0, Vec::len)
    }

    /// Deliver a frame: type-specific handlers first, then wildcard ones.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, frame: &EventFrame) -> usize {
        let mut invoked = self.invoke(&frame.event_type, frame);
        if frame.event_type != WILDCARD {
            invoked += self.invoke(WILDCARD, frame);
        }
        invoked
    }

    fn invoke(&self, key: &str, frame: &EventFrame) -> usize {
        let handlers: Vec<(HandlerId, Arc<HandlerFn>)> = self
            .registry
            .read()
            .get(key)
            .map(|regs| regs.iter().map(|r| (r.id, r.handler.clone())).collect())
            .unwrap_or_default();

        for (id, handler) in &handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    counter!("relay_handler_failures_total", "kind" => "error").increment(1);
                    warn!(
                        event_type = %frame.event_type,
                        listener = key,
                        handler_id = %id,
                        error = %e,
                        "event handler failed"
                    );
                }
                Err(payload) => {
                    counter!("relay_handler_failures_total", "kind" => "panic").increment(1);
                    error!(
                        event_type = %frame.event_type,
                        listener = key,
                        handler_id = %id,
                        panic = panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        handlers.len()
    }

    // ── Correlated requests ─────────────────────────────────────────────

    /// Register a pending request; the returned receiver resolves with the
    /// first frame echoing `request_id`.
    pub fn register_pending(&self, request_id: &str) -> oneshot::Receiver<EventFrame> {
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(request_id.to_owned(), tx);
        rx
    }

    /// Forget a pending request (timed out or never sent).
    pub fn cancel_pending(&self, request_id: &str) {
        let _ = self.pending.lock().remove(request_id);
    }

    /// Hand a response to its waiting request.
    ///
    /// Returns `true` if the frame was consumed as a response; such frames
    /// are not dispatched to listeners.
    pub fn resolve_pending(&self, frame: &EventFrame) -> bool {
        let Some(request_id) = frame.request_id.as_deref() else {
            return false;
        };
        let Some(tx) = self.pending.lock().remove(request_id) else {
            return false;
        };
        // The requester may have given up; the frame is still consumed
        let _ = tx.send(frame.clone());
        true
    }

    /// Fail every pending request. Returns how many were waiting.
    pub fn fail_pending(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        drained.len()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
