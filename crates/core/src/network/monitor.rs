//! Network state monitor
//!
//! Owns the only writable copy of [`NetworkState`]. Consumers read snapshots
//! with [`NetworkStateMonitor::get_state`], register callbacks with
//! [`NetworkStateMonitor::subscribe`], or await transitions on a
//! [`tokio::sync::watch`] receiver.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use fieldsync_common::testing::{Clock, SystemClock};
use fieldsync_domain::{ConnectivitySignal, NetworkState};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::ports::ConnectivitySource;

/// Callback invoked with the current state on subscribe and on every change
pub type NetworkListener = Arc<dyn Fn(&NetworkState) + Send + Sync>;

/// A state waiting to reach listeners. `target` narrows it to the one
/// listener that has just subscribed.
struct Delivery {
    target: Option<u64>,
    state: NetworkState,
}

/// Publish-ordered outbox. Whoever finds it idle drains it; everyone else
/// enqueues and leaves, so callbacks run one at a time in publish order.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<Delivery>,
    draining: bool,
}

struct MonitorInner {
    state_tx: watch::Sender<NetworkState>,
    listeners: Mutex<HashMap<u64, NetworkListener>>,
    outbox: Mutex<Outbox>,
    next_listener_id: AtomicU64,
    slow_latency_threshold: Option<Duration>,
    clock: Arc<dyn Clock>,
}

/// Single source of truth for connectivity
///
/// Cheap to clone; clones observe and update the same state.
#[derive(Clone)]
pub struct NetworkStateMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for NetworkStateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStateMonitor")
            .field("state", &self.get_state())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl Default for NetworkStateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkStateMonitor {
    /// Monitor starting in the optimistic state (online, not slow)
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (state_tx, _) = watch::channel(NetworkState::default());
        Self {
            inner: Arc::new(MonitorInner {
                state_tx,
                listeners: Mutex::new(HashMap::new()),
                outbox: Mutex::new(Outbox::default()),
                next_listener_id: AtomicU64::new(0),
                slow_latency_threshold: None,
                clock,
            }),
        }
    }

    /// Flag online links whose measured latency exceeds `threshold` as slow.
    ///
    /// Must be called before the monitor is cloned or shared.
    #[must_use]
    pub fn with_slow_latency_threshold(mut self, threshold: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.slow_latency_threshold = Some(threshold);
        }
        self
    }

    /// Synchronous snapshot
    pub fn get_state(&self) -> NetworkState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.inner.state_tx.borrow().is_online
    }

    /// Register a listener. It receives the current state immediately, then
    /// every change until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut outbox = self.inner.outbox.lock();
            self.inner.listeners.lock().insert(id, Arc::new(listener));
            outbox.pending.push_back(Delivery { target: Some(id), state: self.get_state() });
        }
        self.deliver();

        Subscription { id, monitor: Arc::downgrade(&self.inner) }
    }

    /// Receiver that yields the latest state whenever it changes
    pub fn watch(&self) -> watch::Receiver<NetworkState> {
        self.inner.state_tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Fold a connectivity reading into the state. Listeners are only called
    /// when the resulting state differs from the previous one.
    ///
    /// Concurrent callers may return before their state has reached every
    /// listener; another caller already delivering will hand it over, in
    /// publish order.
    pub fn apply(&self, signal: ConnectivitySignal) -> NetworkState {
        self.transition(|_| signal)
    }

    /// Flip online/offline, keeping the last known connection type
    pub fn set_online(&self, online: bool) -> NetworkState {
        self.transition(|previous| {
            let signal =
                if online { ConnectivitySignal::online() } else { ConnectivitySignal::offline() };
            signal.with_connection_type(previous.connection_type)
        })
    }

    fn transition<F>(&self, reading: F) -> NetworkState
    where
        F: FnOnce(&NetworkState) -> ConnectivitySignal,
    {
        let (previous, next) = {
            // Held across derive and publish so the outbox order is the publish order
            let mut outbox = self.inner.outbox.lock();
            let mut previous = NetworkState::default();
            let mut next = NetworkState::default();
            let changed = self.inner.state_tx.send_if_modified(|state| {
                previous = *state;
                next = self.derive(state, reading(state));
                if next == previous {
                    return false;
                }
                *state = next;
                true
            });
            if !changed {
                return previous;
            }
            outbox.pending.push_back(Delivery { target: None, state: next });
            (previous, next)
        };

        if previous.is_online != next.is_online {
            info!(
                online = next.is_online,
                connection_type = %next.connection_type,
                "Connectivity changed"
            );
        } else {
            debug!(
                slow = next.is_slow_connection,
                connection_type = %next.connection_type,
                "Link quality changed"
            );
        }

        self.deliver();
        next
    }

    /// Sample `source` and apply the reading, falling back to online when the
    /// source cannot tell
    pub async fn refresh(&self, source: &dyn ConnectivitySource) -> NetworkState {
        match source.sample().await {
            Some(signal) => self.apply(signal),
            None => {
                debug!("Connectivity signal unavailable, assuming online");
                self.apply(ConnectivitySignal::online())
            }
        }
    }

    fn derive(&self, previous: &NetworkState, signal: ConnectivitySignal) -> NetworkState {
        let latency_slow = match (self.inner.slow_latency_threshold, signal.latency_ms) {
            (Some(threshold), Some(latency_ms)) => {
                Duration::from_millis(latency_ms) > threshold
            }
            _ => false,
        };
        let is_slow_connection =
            signal.online && (signal.connection_type.is_slow() || latency_slow);

        let last_connected_at =
            if signal.online && (!previous.is_online || previous.last_connected_at.is_none()) {
                Some(self.inner.clock.now())
            } else {
                previous.last_connected_at
            };

        NetworkState {
            is_online: signal.online,
            is_slow_connection,
            last_connected_at,
            connection_type: signal.connection_type,
        }
    }

    fn deliver(&self) {
        {
            let mut outbox = self.inner.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        let _reset = DrainReset(&self.inner.outbox);

        loop {
            let delivery = {
                let mut outbox = self.inner.outbox.lock();
                match outbox.pending.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            self.notify(&delivery);
        }
    }

    fn notify(&self, delivery: &Delivery) {
        // Snapshot so listeners may subscribe, unsubscribe or publish from inside the callback
        let listeners: Vec<NetworkListener> = {
            let listeners = self.inner.listeners.lock();
            match delivery.target {
                Some(id) => listeners.get(&id).cloned().into_iter().collect(),
                None => listeners.values().cloned().collect(),
            }
        };
        for listener in listeners {
            listener(&delivery.state);
        }
    }
}

/// Releases the outbox if a listener panics mid-drain
struct DrainReset<'a>(&'a Mutex<Outbox>);

impl Drop for DrainReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

/// Handle returned by [`NetworkStateMonitor::subscribe`]
///
/// Dropping it removes the listener.
#[must_use = "dropping the subscription removes the listener immediately"]
pub struct Subscription {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl Subscription {
    /// Remove the listener now
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner.listeners.lock().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
