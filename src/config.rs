//! Runtime configuration loaded from the environment.
//!
//! `.env` is read first (via dotenvy in `main`), then `STEPUP_*` variables.
//! Unset or malformed values fall back to defaults with a log line.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{DEFAULT_MAX_ENTRIES, DOMAIN_MAX_AGE, NETWORK_MAX_AGE};
use crate::storage::FileStorage;
use crate::sync::queue::{RetryPolicy, MAX_RETRIES};

/// Default polling interval for queue drains (30 seconds).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between connectivity probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub health_path: String,
    pub sync_interval: Duration,
    pub probe_interval: Duration,
    pub retry: RetryPolicy,
    pub cache_max_entries: usize,
    /// Max-age for cached GET responses.
    pub network_max_age: Duration,
    /// Max-age for explicitly cached domain objects.
    pub domain_max_age: Duration,
    /// Assume online until the first probe says otherwise.
    pub start_online: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            data_dir: FileStorage::default_dir(),
            health_path: "/health".to_string(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            retry: RetryPolicy::default(),
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            network_max_age: NETWORK_MAX_AGE,
            domain_max_age: DOMAIN_MAX_AGE,
            start_online: true,
        }
    }
}

impl Config {
    /// Build from `STEPUP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "STEPUP_MAX_RETRIES", MAX_RETRIES),
            backoff_base: Duration::from_millis(parse_or(
                &lookup,
                "STEPUP_BACKOFF_BASE_MS",
                defaults.retry.backoff_base.as_millis() as u64,
            )),
            retry_client_errors: parse_or(&lookup, "STEPUP_RETRY_CLIENT_ERRORS", false),
        };

        Self {
            api_url: lookup("STEPUP_API_URL").unwrap_or(defaults.api_url),
            data_dir: lookup("STEPUP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            health_path: lookup("STEPUP_HEALTH_PATH").unwrap_or(defaults.health_path),
            sync_interval: Duration::from_secs(parse_or(
                &lookup,
                "STEPUP_SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL.as_secs(),
            )),
            probe_interval: Duration::from_secs(parse_or(
                &lookup,
                "STEPUP_PROBE_INTERVAL_SECS",
                DEFAULT_PROBE_INTERVAL.as_secs(),
            )),
            retry,
            cache_max_entries: parse_or(&lookup, "STEPUP_CACHE_MAX_ENTRIES", DEFAULT_MAX_ENTRIES),
            ..defaults
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            log::warn!("Invalid {} value {:?} ({}), using default: {}", key, raw, e, default);
            default
        }),
    }
}
