//! Background sync daemon.
//!
//! Drains the offline queue every 30 seconds while online, probes the API for
//! reachability so connectivity transitions are noticed, and drains on demand
//! when something sends on the manual trigger channel.

pub mod engine;
pub mod queue;

pub use engine::{DrainReport, SkipReason};
pub use queue::{OperationKind, OperationQueue, QueuedOperation, RetryPolicy};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use crate::api::Network;
use crate::config::DEFAULT_SYNC_INTERVAL;
use crate::service::OfflineService;

/// Channel sender type for triggering an immediate drain.
pub type SyncTrigger = mpsc::Sender<()>;

pub struct SyncDaemon<N: Network> {
    service: Arc<OfflineService<N>>,
    /// Drain interval (default 30s).
    poll_interval: Duration,
    /// Connectivity probe interval; `None` disables probing.
    probe_interval: Option<Duration>,
    /// Manual drain triggers.
    sync_now_rx: mpsc::Receiver<()>,
}

impl<N: Network> SyncDaemon<N> {
    /// Create a daemon and the sender that triggers it manually.
    pub fn new(service: Arc<OfflineService<N>>) -> (Self, SyncTrigger) {
        let (tx, rx) = mpsc::channel(8);
        let daemon = Self {
            service,
            poll_interval: DEFAULT_SYNC_INTERVAL,
            probe_interval: None,
            sync_now_rx: rx,
        };
        (daemon, tx)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval);
        self
    }

    /// Main run loop; returns when `shutdown` completes.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup isn't a drain storm.
        ticker.tick().await;

        let mut probe = self.probe_interval.map(|period| {
            let mut probe = tokio::time::interval(period);
            probe.set_missed_tick_behavior(MissedTickBehavior::Skip);
            probe
        });

        log::info!(
            "Sync daemon started (interval: {}s, probe: {})",
            self.poll_interval.as_secs(),
            self.probe_interval
                .map(|p| format!("{}s", p.as_secs()))
                .unwrap_or_else(|| "off".to_string())
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Sync daemon stopping");
                    break;
                }
                _ = ticker.tick() => {
                    // drain() itself is a no-op while offline
                    let report = self.service.drain().await;
                    if report.was_skipped() {
                        log::debug!("Scheduled drain skipped: {:?}", report.skipped);
                    }
                    // Ticks that elapsed during the pass are dropped
                    ticker.reset();
                }
                _ = tick_optional(&mut probe) => {
                    self.probe_once().await;
                    if let Some(probe) = probe.as_mut() {
                        probe.reset();
                    }
                }
                Some(()) = self.sync_now_rx.recv() => {
                    log::info!("Manual sync triggered");
                    self.service.drain().await;
                    ticker.reset();
                }
            }
        }
    }

    /// Probe reachability and feed the result into the service.
    pub async fn probe_once(&self) -> bool {
        let reachable = self.service.network().probe().await;
        self.service.set_online(reachable).await;
        reachable
    }
}

/// Tick `interval` if there is one; pend forever otherwise.
async fn tick_optional(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
