//! Connectivity monitor.
//!
//! Holds the "network reachable" flag and fans transitions out to registered
//! listeners. Listener calls are synchronous and isolated from each other: a
//! panicking listener is logged and the rest are still called.

pub mod quality;

pub use quality::{ConnectionInfo, EffectiveType};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Callback invoked with the new online state.
pub type Listener = Arc<dyn Fn(bool) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, Listener)>>;

pub struct ConnectivityMonitor {
    online: AtomicBool,
    listeners: Arc<ListenerList>,
    next_id: AtomicU64,
    info: Mutex<Option<ConnectionInfo>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            info: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record the current state. Returns `true` if this was a transition,
    /// in which case every listener has been notified.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }
        if online {
            log::info!("Connectivity restored");
        } else {
            log::info!("Network appears offline");
        }
        self.notify(online);
        true
    }

    fn notify(&self, online: bool) {
        // Clone out so listeners may subscribe/unsubscribe while being called.
        let listeners: Vec<(u64, Listener)> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(online))).is_err() {
                log::error!("Connectivity listener {} panicked", id);
            }
        }
    }

    /// Register `listener`; it stays registered until the returned
    /// subscription is unsubscribed.
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn set_connection_info(&self, info: Option<ConnectionInfo>) {
        *self.info.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        *self.info.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the last reported connection quality is slow.
    pub fn is_slow(&self) -> bool {
        self.connection_info().map(|i| i.is_slow()).unwrap_or(false)
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Remove the listener. A no-op if the monitor is gone.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}
