//! User-visible notifications raised by the offline service.
//!
//! The service only decides *when* to notify; a [`Notifier`] decides how the
//! message is shown. UI surfaces display each one for [`DISPLAY_DURATION`].

pub mod status;

pub use status::SyncStatus;

use std::sync::Mutex;
use std::time::Duration;

/// How long a transient toast stays on screen.
pub const DISPLAY_DURATION: Duration = Duration::from_secs(3);

/// Why an operation left the queue without reaching the server.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// Failed more times than the retry ceiling allows.
    RetriesExhausted { attempts: u32, last_error: String },
    /// The server rejected it with a client error; retrying would not help.
    Rejected { status: u16, body: String },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            DropReason::Rejected { status, body } => {
                write!(f, "rejected by server ({}): {}", status, body)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An operation was queued for later replay.
    Queued { id: String, target: String },
    /// A drain pass emptied the queue.
    Synced { count: usize },
    /// An operation was discarded.
    Dropped {
        id: String,
        target: String,
        reason: DropReason,
    },
}

impl Notification {
    /// Toast text.
    pub fn message(&self) -> String {
        match self {
            Notification::Queued { .. } => {
                "You're offline. Your change was saved and will sync when you reconnect."
                    .to_string()
            }
            Notification::Synced { count: 1 } => "1 change synced".to_string(),
            Notification::Synced { count } => format!("All {} changes synced", count),
            Notification::Dropped { target, reason, .. } => {
                format!("A change to {} could not be synced ({})", target, reason)
            }
        }
    }

    pub fn display_duration(&self) -> Duration {
        DISPLAY_DURATION
    }
}

/// Receives notifications from the service. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::Dropped { .. } => log::warn!("{}", notification.message()),
            _ => log::info!("{}", notification.message()),
        }
    }
}

/// Keeps every notification in memory, for tests and status polling.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count_synced(&self) -> usize {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, Notification::Synced { .. }))
            .count()
    }

    pub fn count_queued(&self) -> usize {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, Notification::Queued { .. }))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
    }
}
