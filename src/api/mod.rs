//! Network layer for the offline service.
//!
//! The [`Network`] trait is the seam between the drain engine and the real
//! HTTP client; tests substitute scripted implementations.

pub mod client;
pub mod types;

use std::future::Future;

pub use client::ApiClient;
pub use types::{HttpMethod, NetworkRequest, NetworkResponse};

use crate::error::NetworkError;

/// Executes outbound calls on behalf of the service.
pub trait Network: Send + Sync {
    /// Issue one request. Any HTTP status is `Ok`; only transport-level
    /// failures are `Err`.
    fn execute(
        &self,
        request: &NetworkRequest,
    ) -> impl Future<Output = Result<NetworkResponse, NetworkError>> + Send;

    /// Cheap reachability check used as the connectivity signal.
    fn probe(&self) -> impl Future<Output = bool> + Send;
}
