//! Offline request queue and response cache for the Step Up Naija client.
//!
//! [`OfflineService`] is the single entry point: UI code issues
//! network-aware requests, queues mutations for later replay, reads cached
//! responses and watches connectivity through it. [`sync::SyncDaemon`]
//! drains the queue in the background.

pub mod api;
pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod notify;
pub mod service;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, Network};
pub use config::Config;
pub use error::{NetworkError, OfflineError, StorageError};
pub use service::{NetworkStatus, OfflineService, RequestOptions};
pub use sync::{OperationKind, QueuedOperation, SyncDaemon};
