//! The offline service context.
//!
//! One `OfflineService` owns the operation queue, the response cache and the
//! connectivity flag. It is built once at startup with injected storage, clock,
//! network and notifier, hydrates from storage, and persists after every
//! mutation. Persistence failures are logged and never reach callers; the
//! in-memory state keeps working for the rest of the session.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::types::{HttpMethod, NetworkRequest};
use crate::api::Network;
use crate::cache::{CacheLookup, CacheRecord, ResponseCache};
use crate::clock::Clock;
use crate::config::Config;
use crate::connectivity::{ConnectionInfo, ConnectivityMonitor, Subscription};
use crate::error::{NetworkError, OfflineError};
use crate::notify::{DropReason, Notification, Notifier, SyncStatus};
use crate::storage::{Storage, CACHE_KEY, LEGACY_KEY, QUEUE_KEY};
use crate::sync::queue::{OperationKind, OperationQueue, QueuedOperation, RetryPolicy};

/// Dropped operations kept for the caller to review.
pub const MAX_DROPPED: usize = 100;

/// Options for [`OfflineService::request`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub body: Option<Value>,
    /// Max-age for caching a GET result; the network default when `None`.
    pub max_age: Option<Duration>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: HttpMethod::Get,
            body: None,
            max_age: None,
        }
    }

    pub fn with_method(method: HttpMethod, body: Option<Value>) -> Self {
        Self {
            method,
            body,
            max_age: None,
        }
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

/// Synchronous status snapshot for badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub is_online: bool,
    pub queue_length: usize,
    pub cache_size: usize,
    pub is_slow: bool,
    pub is_syncing: bool,
}

impl NetworkStatus {
    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus::from_parts(self.is_online, self.is_syncing, self.queue_length)
    }
}

/// An operation that left the queue without reaching the server.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedOperation {
    pub operation: QueuedOperation,
    pub reason: DropReason,
    pub dropped_at: DateTime<Utc>,
}

/// Combined record written by older clients under [`LEGACY_KEY`].
#[derive(Debug, Default, Deserialize)]
struct LegacyRecord {
    #[serde(default)]
    queue: Vec<QueuedOperation>,
    #[serde(default)]
    cache: HashMap<String, CacheRecord>,
}

pub struct OfflineService<N: Network> {
    pub(crate) network: N,
    storage: Arc<dyn Storage>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) connectivity: ConnectivityMonitor,
    pub(crate) queue: Mutex<OperationQueue>,
    cache: Mutex<ResponseCache>,
    pub(crate) draining: AtomicBool,
    dropped: Mutex<VecDeque<DroppedOperation>>,
    pub(crate) network_max_age: Duration,
    domain_max_age: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<N: Network> OfflineService<N> {
    /// Build the service and hydrate queue and cache from `storage`.
    pub fn create(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        network: N,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        let (queue, cache) = hydrate(storage.as_ref(), config.retry, config.cache_max_entries);
        log::info!(
            "Offline service ready ({} queued operations, {} cached entries)",
            queue.len(),
            cache.len()
        );

        Self {
            network,
            storage,
            clock,
            notifier,
            connectivity: ConnectivityMonitor::new(config.start_online),
            queue: Mutex::new(queue),
            cache: Mutex::new(cache),
            draining: AtomicBool::new(false),
            dropped: Mutex::new(VecDeque::new()),
            network_max_age: config.network_max_age,
            domain_max_age: config.domain_max_age,
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    // ── Read/write path ─────────────────────────────────────────────────────

    /// Network-aware request.
    ///
    /// Online: executes now and caches successful GET results. Offline, or
    /// when the call fails below HTTP: a GET is served from a fresh cache
    /// entry if there is one; anything else is queued for replay and the
    /// call fails with [`OfflineError::Queued`]. Mutating verbs are never
    /// attempted while offline.
    pub async fn request(&self, target: &str, options: RequestOptions) -> Result<Value, OfflineError> {
        let is_get = options.method == HttpMethod::Get;

        if self.connectivity.is_online() {
            // Slow link: a fresh cached copy beats a round-trip.
            if is_get && self.connectivity.is_slow() {
                if let Some(value) = self.get_cached(target) {
                    log::debug!("Slow connection, served {} from cache", target);
                    return Ok(value);
                }
            }

            let request = NetworkRequest {
                method: options.method,
                target: target.to_string(),
                body: options.body.clone(),
            };
            match self.network.execute(&request).await {
                Ok(resp) if resp.is_success() => {
                    if is_get {
                        let max_age = options.max_age.unwrap_or(self.network_max_age);
                        self.cache(target, resp.body.clone(), max_age);
                    }
                    return Ok(resp.body);
                }
                Ok(resp) => {
                    return Err(OfflineError::Http {
                        status: resp.status,
                        body: resp.body_text(),
                    });
                }
                Err(e @ NetworkError::InvalidTarget(_)) => return Err(e.into()),
                Err(NetworkError::Transport(e)) => {
                    log::warn!("{} {} failed, using offline path: {}", options.method.as_str(), target, e);
                }
            }
        }

        if is_get {
            if let Some(value) = self.get_cached(target) {
                return Ok(value);
            }
        }

        let id = self.queue_mutation(OperationKind::from_method(options.method), target, options.body);
        Err(OfflineError::Queued { id })
    }

    /// Queue an operation without attempting it. Returns the operation id.
    pub fn queue_mutation(&self, kind: OperationKind, target: &str, payload: Option<Value>) -> String {
        let op = QueuedOperation::new(kind, target, payload, self.clock.now());
        let id = op.id.clone();

        {
            let mut queue = lock(&self.queue);
            queue.enqueue(op);
            log::info!(
                "Queued {:?} {} as {} ({} pending)",
                kind,
                target,
                id,
                queue.len()
            );
            self.persist_queue(&queue);
        }

        self.notifier.notify(&Notification::Queued {
            id: id.clone(),
            target: target.to_string(),
        });
        id
    }

    /// Fresh cached value for `key`, evicting it if stale.
    pub fn get_cached(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut cache = lock(&self.cache);
        let lookup = cache.get(key, now);
        match lookup {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss => None,
            CacheLookup::Evicted => {
                self.persist_cache(&cache);
                None
            }
        }
    }

    /// Store `value` under `key` for `max_age`.
    pub fn cache(&self, key: &str, value: Value, max_age: Duration) {
        let now = self.clock.now();
        let mut cache = lock(&self.cache);
        cache.set(key, value, max_age, now);
        self.persist_cache(&cache);
    }

    /// Cache a domain object with the long (24 h) max-age.
    pub fn cache_domain_object(&self, key: &str, value: Value) {
        self.cache(key, value, self.domain_max_age);
    }

    // ── Connectivity ────────────────────────────────────────────────────────

    /// Feed a connectivity signal. A transition to online drains right away.
    ///
    /// Returns whether this was a transition.
    pub async fn set_online(&self, online: bool) -> bool {
        let changed = self.connectivity.set_online(online);
        if changed && online {
            let report = self.drain().await;
            log::debug!("Reconnect drain: {:?}", report);
        }
        changed
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn set_connection_info(&self, info: Option<ConnectionInfo>) {
        self.connectivity.set_connection_info(info);
    }

    /// Register for online/offline transitions.
    pub fn on_connectivity_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.connectivity.subscribe(Arc::new(listener))
    }

    // ── Introspection ───────────────────────────────────────────────────────

    pub fn get_network_status(&self) -> NetworkStatus {
        NetworkStatus {
            is_online: self.connectivity.is_online(),
            queue_length: lock(&self.queue).len(),
            cache_size: lock(&self.cache).len(),
            is_slow: self.connectivity.is_slow(),
            is_syncing: self.draining.load(Ordering::SeqCst),
        }
    }

    /// Pending operations in replay order.
    pub fn queued_operations(&self) -> Vec<QueuedOperation> {
        lock(&self.queue).snapshot()
    }

    /// Operations dropped this session, oldest first.
    pub fn dropped_operations(&self) -> Vec<DroppedOperation> {
        lock(&self.dropped).iter().cloned().collect()
    }

    /// Drain the dropped-operation list (e.g. after showing it to the user).
    pub fn take_dropped_operations(&self) -> Vec<DroppedOperation> {
        lock(&self.dropped).drain(..).collect()
    }

    /// Wipe queue, cache and their stored copies (logout / privacy wipe).
    pub fn clear_all(&self) {
        lock(&self.queue).clear();
        lock(&self.cache).clear();
        lock(&self.dropped).clear();
        for key in [QUEUE_KEY, CACHE_KEY, LEGACY_KEY] {
            if let Err(e) = self.storage.remove(key) {
                log::warn!("Failed to remove stored {}: {}", key, e);
            }
        }
        log::info!("Offline queue and cache cleared");
    }

    // ── Internals used by the drain engine ──────────────────────────────────

    pub(crate) fn record_dropped(&self, operation: QueuedOperation, reason: DropReason) {
        log::error!(
            "Dropped queued {:?} {} ({}): {}",
            operation.kind,
            operation.target,
            operation.id,
            reason
        );
        self.notifier.notify(&Notification::Dropped {
            id: operation.id.clone(),
            target: operation.target.clone(),
            reason: reason.clone(),
        });

        let mut dropped = lock(&self.dropped);
        if dropped.len() >= MAX_DROPPED {
            dropped.pop_front();
        }
        dropped.push_back(DroppedOperation {
            operation,
            reason,
            dropped_at: self.clock.now(),
        });
    }

    pub(crate) fn lock_queue(&self) -> MutexGuard<'_, OperationQueue> {
        lock(&self.queue)
    }

    /// Persist the queue. Called with the lock held so writes stay ordered.
    pub(crate) fn persist_queue(&self, queue: &OperationQueue) {
        let result = queue
            .to_json()
            .map_err(Into::into)
            .and_then(|json| self.storage.save(QUEUE_KEY, &json));
        if let Err(e) = result {
            log::warn!("Failed to persist offline queue: {}", e);
        }
    }

    fn persist_cache(&self, cache: &ResponseCache) {
        let result = serde_json::to_string(&cache.to_records())
            .map_err(Into::into)
            .and_then(|json| self.storage.save(CACHE_KEY, &json));
        if let Err(e) = result {
            log::warn!("Failed to persist offline cache: {}", e);
        }
    }
}

/// Load queue and cache, migrating the legacy combined record if that is all
/// there is. Unreadable data is logged and replaced with an empty store.
fn hydrate(
    storage: &dyn Storage,
    policy: RetryPolicy,
    max_entries: usize,
) -> (OperationQueue, ResponseCache) {
    let load = |key: &str| match storage.load(key) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Failed to load stored {}: {}", key, e);
            None
        }
    };

    let queue_json = load(QUEUE_KEY);
    let cache_json = load(CACHE_KEY);

    if queue_json.is_none() && cache_json.is_none() {
        if let Some(legacy) = load(LEGACY_KEY) {
            return migrate_legacy(storage, &legacy, policy, max_entries);
        }
    }

    let ops = match queue_json.as_deref().map(OperationQueue::parse_operations) {
        Some(Ok(ops)) => ops,
        Some(Err(e)) => {
            log::warn!("Discarding unreadable offline queue: {}", e);
            Vec::new()
        }
        None => Vec::new(),
    };

    let records = match cache_json
        .as_deref()
        .map(serde_json::from_str::<HashMap<String, CacheRecord>>)
    {
        Some(Ok(records)) => records,
        Some(Err(e)) => {
            log::warn!("Discarding unreadable offline cache: {}", e);
            HashMap::new()
        }
        None => HashMap::new(),
    };

    (
        OperationQueue::from_operations(ops, policy),
        ResponseCache::from_records(records, max_entries),
    )
}

fn migrate_legacy(
    storage: &dyn Storage,
    json: &str,
    policy: RetryPolicy,
    max_entries: usize,
) -> (OperationQueue, ResponseCache) {
    let record: LegacyRecord = serde_json::from_str(json).unwrap_or_else(|e| {
        log::warn!("Discarding unreadable legacy offline data: {}", e);
        LegacyRecord::default()
    });
    log::info!(
        "Migrating legacy offline data ({} operations, {} cache entries)",
        record.queue.len(),
        record.cache.len()
    );

    let queue = OperationQueue::from_operations(record.queue, policy);
    let cache = ResponseCache::from_records(record.cache, max_entries);

    let migrated = queue
        .to_json()
        .map_err(Into::into)
        .and_then(|q| storage.save(QUEUE_KEY, &q))
        .and_then(|()| {
            serde_json::to_string(&cache.to_records())
                .map_err(Into::into)
                .and_then(|c| storage.save(CACHE_KEY, &c))
        })
        .and_then(|()| storage.remove(LEGACY_KEY));
    if let Err(e) = migrated {
        log::warn!("Legacy offline data migration incomplete: {}", e);
    }

    (queue, cache)
}
