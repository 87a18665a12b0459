//! Response cache with per-entry max-age and an LRU capacity bound.
//!
//! Stale entries are evicted lazily when read; there is no background sweep.
//! When the store is full the least recently accessed entry makes room.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Max-age applied to cached network responses.
pub const NETWORK_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Max-age applied to explicitly cached domain objects.
pub const DOMAIN_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default capacity bound.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// Persisted form of a cache entry: `{data, timestamp, maxAge}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds.
    pub max_age: u64,
}

struct CacheEntry {
    value: Value,
    stored_at: DateTime<Utc>,
    max_age: Duration,
    /// Logical access tick for LRU ordering.
    accessed: u64,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.stored_at);
        match chrono::Duration::from_std(self.max_age) {
            Ok(max_age) => age <= max_age,
            // max_age too large to represent: never stale
            Err(_) => true,
        }
    }
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Value),
    Miss,
    /// The entry existed but was stale and has been removed.
    Evicted,
}

/// Key-value store of previously fetched results.
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    tick: u64,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Store `value` under `key`, replacing any prior entry.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn set(
        &mut self,
        key: &str,
        value: Value,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Option<String> {
        self.entries.remove(key);

        let mut evicted = None;
        while self.entries.len() >= self.max_entries {
            match self.evict_lru() {
                Some(k) => evicted = Some(k),
                None => break,
            }
        }

        let accessed = self.next_tick();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
                max_age,
                accessed,
            },
        );
        evicted
    }

    /// Read `key`, evicting it if stale.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> CacheLookup {
        let fresh = match self.entries.get(key) {
            None => return CacheLookup::Miss,
            Some(entry) => entry.is_fresh(now),
        };

        if !fresh {
            self.entries.remove(key);
            log::debug!("Cache entry expired: {}", key);
            return CacheLookup::Evicted;
        }

        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.accessed = tick;
                CacheLookup::Hit(entry.value.clone())
            }
            None => CacheLookup::Miss,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is present at all, fresh or not.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, v)| v.accessed)
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&oldest);
        log::debug!("Cache full, evicted least recently used entry: {}", oldest);
        Some(oldest)
    }

    /// Snapshot in persisted form.
    pub fn to_records(&self) -> HashMap<String, CacheRecord> {
        self.entries
            .iter()
            .map(|(k, e)| {
                (
                    k.clone(),
                    CacheRecord {
                        data: e.value.clone(),
                        timestamp: e.stored_at,
                        max_age: u64::try_from(e.max_age.as_millis()).unwrap_or(u64::MAX),
                    },
                )
            })
            .collect()
    }

    /// Rebuild from persisted records. Oldest records get the lowest LRU rank.
    pub fn from_records(records: HashMap<String, CacheRecord>, max_entries: usize) -> Self {
        let mut cache = Self::new(max_entries);
        let mut sorted: Vec<(String, CacheRecord)> = records.into_iter().collect();
        sorted.sort_by_key(|(_, r)| r.timestamp);
        for (key, record) in sorted {
            cache.set(
                &key,
                record.data,
                Duration::from_millis(record.max_age),
                record.timestamp,
            );
        }
        cache
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
