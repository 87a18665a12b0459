//! Scripted collaborators shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::api::types::{NetworkRequest, NetworkResponse};
use crate::api::Network;
use crate::clock::ManualClock;
use crate::config::Config;
use crate::error::NetworkError;
use crate::notify::RecordingNotifier;
use crate::service::OfflineService;
use crate::storage::MemoryStorage;

type Scripted = Result<NetworkResponse, NetworkError>;

/// Network double: records calls, answers from per-target scripts or a
/// default, and can hold calls until a gate is opened.
pub struct MockNetwork {
    calls: Mutex<Vec<NetworkRequest>>,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    default: Mutex<Scripted>,
    gate: Mutex<Option<Arc<Notify>>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    reachable: AtomicBool,
}

impl MockNetwork {
    /// Every call succeeds with `{"ok": true}`.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            default: Mutex::new(Ok(NetworkResponse::ok(serde_json::json!({"ok": true})))),
            gate: Mutex::new(None),
            latency: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn set_default(&self, result: Scripted) {
        *self.default.lock().unwrap() = result;
    }

    pub fn fail_with_status(&self, status: u16) {
        self.set_default(Ok(NetworkResponse::new(status, Value::Null)));
    }

    pub fn fail_with_transport(&self) {
        self.set_default(Err(NetworkError::Transport("connection refused".into())));
    }

    /// Queue a one-shot answer for `target`.
    pub fn script(&self, target: &str, result: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .push_back(result);
    }

    /// Hold every call until the returned `Notify` is signalled.
    pub fn install_gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make every call take `latency` of tokio time before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<NetworkRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn targets(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.target).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, target: &str) -> Scripted {
        if let Some(next) = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(target)
            .and_then(|q| q.pop_front())
        {
            return next;
        }
        self.default.lock().unwrap().clone()
    }
}

impl Network for MockNetwork {
    async fn execute(&self, request: &NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        self.calls.lock().unwrap().push(request.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.answer(&request.target)
    }

    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Everything a service test needs to poke at.
pub struct Harness {
    pub service: Arc<OfflineService<MockNetwork>>,
    pub storage: Arc<MemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    /// Offline, zero backoff, default retry ceiling.
    pub fn offline() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()), false)
    }

    pub fn online() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()), true)
    }

    pub fn with_storage(storage: Arc<MemoryStorage>, online: bool) -> Self {
        let mut config = test_config();
        config.start_online = online;
        Self::with_config(storage, &config)
    }

    pub fn with_config(storage: Arc<MemoryStorage>, config: &Config) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let notifier = Arc::new(RecordingNotifier::new());
        let service = OfflineService::create(
            storage.clone(),
            clock.clone(),
            MockNetwork::new(),
            notifier.clone(),
            config,
        );
        Self {
            service: Arc::new(service),
            storage,
            clock,
            notifier,
        }
    }

    pub fn network(&self) -> &MockNetwork {
        self.service.network()
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.backoff_base = std::time::Duration::ZERO;
    config
}
