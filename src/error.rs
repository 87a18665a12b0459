//! Error types shared across the offline service.
//!
//! Only `OfflineError` ever reaches UI callers. Storage and background
//! drain failures are logged and contained inside the service.

use thiserror::Error;

/// Failure of a single outbound network call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NetworkError {
    /// The request never produced an HTTP status (DNS, refused, timed out...).
    #[error("transport error: {0}")]
    Transport(String),
    /// The target could not be turned into a request URL.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Failure reading or writing durable storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage quota exceeded ({0} bytes)")]
    Quota(usize),
}

/// Errors surfaced to callers of [`crate::OfflineService::request`].
#[derive(Debug, Error)]
pub enum OfflineError {
    /// Offline (or unreachable) and nothing usable in the cache.
    #[error("offline, request queued as {id}, no cached data available")]
    Queued { id: String },
    /// The server answered with a non-success status.
    #[error("request failed ({status}): {body}")]
    Http { status: u16, body: String },
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("invalid response body: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OfflineError {
    /// Id of the operation queued in place of this request, if any.
    pub fn queued_id(&self) -> Option<&str> {
        match self {
            OfflineError::Queued { id } => Some(id),
            _ => None,
        }
    }
}
