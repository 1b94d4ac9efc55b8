//! Connection state tracking with synchronous listener broadcast.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// State of the live link to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Callback invoked with the new state on every transition.
pub type StateListener = Arc<dyn Fn(LinkState) + Send + Sync>;

struct TrackerInner {
    state: RwLock<LinkState>,
    /// Listeners in registration order.
    listeners: Mutex<Vec<(u64, StateListener)>>,
    next_id: AtomicU64,
}

/// Owns the current [`LinkState`] and the set of listeners notified on
/// every transition.
///
/// Cloning yields another handle to the same state; construct one per
/// process and share it.
#[derive(Clone)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    /// New tracker in [`LinkState::Disconnected`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                state: RwLock::new(LinkState::Disconnected),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.inner.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Replace the current state and notify every listener before returning.
    ///
    /// Listeners run outside the internal locks, so a listener may read the
    /// state or register further listeners.
    pub fn set_state(&self, next: LinkState) {
        let previous = std::mem::replace(&mut *self.inner.state.write(), next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "link state transition");
        }

        let listeners: Vec<StateListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(next);
        }
    }

    /// Register a listener. It is invoked once right away with the current
    /// state, then on every subsequent transition.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(LinkState) + Send + Sync + 'static,
    {
        let listener: StateListener = Arc::new(listener);
        listener(self.state());

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().push((id, listener));

        ListenerHandle {
            id,
            tracker: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTracker")
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Removes exactly the listener it was returned for.
#[derive(Clone, Debug)]
pub struct ListenerHandle {
    id: u64,
    tracker: Weak<TrackerInner>,
}

impl ListenerHandle {
    /// Detach the listener. Returns false if it was already removed or the
    /// tracker is gone.
    pub fn remove(&self) -> bool {
        let Some(inner) = self.tracker.upgrade() else {
            return false;
        };
        let mut listeners = inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}
