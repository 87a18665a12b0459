//! Sync status shown on "pending sync" badges.
//!
//! Derived from the network status snapshot; `SyncStatus::label()` is the
//! human-readable line UI surfaces display.

/// All states the offline service can be in, from a badge's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Online with nothing waiting.
    Synced,
    /// Online with operations waiting for the next drain.
    Pending(usize),
    /// A drain pass is running.
    Syncing,
    /// Offline; the count is what will replay on reconnect.
    Offline(usize),
}

impl SyncStatus {
    pub fn from_parts(is_online: bool, is_draining: bool, queue_length: usize) -> Self {
        match (is_online, is_draining) {
            (false, _) => SyncStatus::Offline(queue_length),
            (true, true) => SyncStatus::Syncing,
            (true, false) if queue_length > 0 => SyncStatus::Pending(queue_length),
            (true, false) => SyncStatus::Synced,
        }
    }

    /// Human-readable status text.
    pub fn label(&self) -> String {
        match self {
            SyncStatus::Synced => "All changes synced".to_string(),
            SyncStatus::Pending(1) => "1 change pending sync".to_string(),
            SyncStatus::Pending(n) => format!("{} changes pending sync", n),
            SyncStatus::Syncing => "Syncing...".to_string(),
            SyncStatus::Offline(0) => "Offline".to_string(),
            SyncStatus::Offline(n) => format!("Offline ({} queued)", n),
        }
    }

    /// Whether there is work the user has not seen reach the server yet.
    pub fn has_pending(&self) -> bool {
        matches!(self, SyncStatus::Pending(_) | SyncStatus::Syncing)
            || matches!(self, SyncStatus::Offline(n) if *n > 0)
    }
}
