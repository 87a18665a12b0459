//! Queue drain: replays queued operations against the network.
//!
//! A pass works from a snapshot taken at its start and awaits each call in
//! turn, so operations replay in insertion order and never overlap. Results
//! are applied to the live queue by id. The queue is persisted once per pass.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::Network;
use crate::notify::{DropReason, Notification};
use crate::service::OfflineService;
use crate::sync::queue::{FailureOutcome, OperationKind};

/// Why a drain call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
    Empty,
}

/// Summary of one drain call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub skipped: Option<SkipReason>,
    /// Network calls issued.
    pub attempted: usize,
    pub synced: usize,
    /// Failed but still queued.
    pub retried: usize,
    /// Removed after exceeding the retry ceiling or being rejected.
    pub dropped: usize,
    /// Not attempted because their backoff has not elapsed.
    pub deferred: usize,
    /// Queue length after the pass.
    pub remaining: usize,
}

impl DrainReport {
    fn skipped(reason: SkipReason, remaining: usize) -> Self {
        Self {
            skipped: Some(reason),
            remaining,
            ..Self::default()
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// Clears the in-progress flag when the pass ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<N: Network> OfflineService<N> {
    /// Replay every queued operation once.
    ///
    /// No-op while offline, while another drain is running, or when the
    /// queue is empty. Never fails; per-operation failures are retried up to
    /// the ceiling and then dropped (and reported to the notifier).
    pub async fn drain(&self) -> DrainReport {
        if !self.connectivity.is_online() {
            return DrainReport::skipped(SkipReason::Offline, self.lock_queue().len());
        }

        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Drain already in progress, skipping");
            return DrainReport::skipped(SkipReason::AlreadyRunning, self.lock_queue().len());
        }
        let _guard = DrainGuard(&self.draining);

        let (snapshot, policy) = {
            let queue = self.lock_queue();
            (queue.snapshot(), *queue.policy())
        };
        if snapshot.is_empty() {
            return DrainReport::skipped(SkipReason::Empty, 0);
        }

        log::info!("Processing {} queued operations", snapshot.len());
        let mut report = DrainReport::default();

        for op in snapshot {
            let now = self.clock.now();
            if !op.is_due(now) {
                report.deferred += 1;
                continue;
            }

            report.attempted += 1;
            let result = self.network.execute(&op.to_request()).await;

            let failure = match result {
                Ok(resp) if resp.is_success() => {
                    self.lock_queue().remove(&op.id);
                    if op.kind == OperationKind::Read {
                        self.cache(&op.target, resp.body, self.network_max_age);
                    }
                    log::info!("Queued operation synced: {:?} {} ({})", op.kind, op.target, op.id);
                    report.synced += 1;
                    continue;
                }
                Ok(resp) if resp.is_client_error() && !policy.retry_client_errors => {
                    let removed = self.lock_queue().remove(&op.id);
                    if let Some(removed) = removed {
                        report.dropped += 1;
                        self.record_dropped(
                            removed,
                            DropReason::Rejected {
                                status: resp.status,
                                body: resp.body_text(),
                            },
                        );
                    }
                    continue;
                }
                Ok(resp) => format!("HTTP {}", resp.status),
                Err(e) => e.to_string(),
            };

            let outcome = self.lock_queue().record_failure(&op.id, self.clock.now());
            match outcome {
                FailureOutcome::Retry { attempts, retry_at } => {
                    log::warn!(
                        "Queued operation retry {}/{}: {:?} {} ({}) - {}; next attempt after {}",
                        attempts,
                        policy.max_retries,
                        op.kind,
                        op.target,
                        op.id,
                        failure,
                        retry_at.to_rfc3339()
                    );
                    report.retried += 1;
                }
                FailureOutcome::Dropped(removed) => {
                    report.dropped += 1;
                    let attempts = removed.attempts;
                    self.record_dropped(
                        removed,
                        DropReason::RetriesExhausted {
                            attempts,
                            last_error: failure,
                        },
                    );
                }
                FailureOutcome::Missing => {
                    log::debug!("Operation {} left the queue during the drain", op.id);
                }
            }
        }

        let remaining = {
            let queue = self.lock_queue();
            self.persist_queue(&queue);
            queue.len()
        };
        report.remaining = remaining;

        if remaining == 0 && report.synced > 0 {
            self.notifier.notify(&Notification::Synced {
                count: report.synced,
            });
        }

        log::info!(
            "Drain finished: {} synced, {} retrying, {} dropped, {} deferred, {} remaining",
            report.synced,
            report.retried,
            report.dropped,
            report.deferred,
            report.remaining
        );
        report
    }
}
