//! Command handlers for the `stepup-sync` binary.
//!
//! Each handler works against a service hydrated from the on-disk store, so
//! operations queued by one invocation are replayed by a later one.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::api::types::HttpMethod;
use crate::api::Network;
use crate::service::{OfflineService, RequestOptions};
use crate::sync::queue::{OperationKind, QueuedOperation};
use crate::sync::SyncDaemon;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    #[serde(flatten)]
    status: crate::service::NetworkStatus,
    label: String,
    pending: Vec<QueuedOperation>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to render output: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn parse_payload(payload: Option<&str>) -> Result<Option<Value>, String> {
    payload
        .map(|p| serde_json::from_str(p).map_err(|e| format!("Invalid JSON payload: {}", e)))
        .transpose()
}

/// Probe the API and record the result. Transitions to online drain.
pub async fn refresh_connectivity<N: Network>(service: &OfflineService<N>) -> bool {
    let reachable = service.network().probe().await;
    service.set_online(reachable).await;
    reachable
}

/// Print status, the badge label and pending operations.
pub async fn status<N: Network>(service: &OfflineService<N>) -> Result<(), String> {
    refresh_connectivity(service).await;
    let status = service.get_network_status();
    print_json(&StatusOutput {
        status,
        label: status.sync_status().label(),
        pending: service.queued_operations(),
    })
}

/// Queue an operation for later replay.
pub fn enqueue<N: Network>(
    service: &OfflineService<N>,
    kind: &str,
    target: &str,
    payload: Option<&str>,
) -> Result<(), String> {
    let kind: OperationKind = kind.parse()?;
    let payload = parse_payload(payload)?;
    let id = service.queue_mutation(kind, target, payload);
    println!("{}", id);
    Ok(())
}

/// Network-aware request; prints the response body.
pub async fn request<N: Network>(
    service: &OfflineService<N>,
    target: &str,
    method: &str,
    payload: Option<&str>,
) -> Result<(), String> {
    let method: HttpMethod = method.parse()?;
    let body = parse_payload(payload)?;
    refresh_connectivity(service).await;

    let value = service
        .request(target, RequestOptions::with_method(method, body))
        .await
        .map_err(|e| e.to_string())?;
    print_json(&value)
}

/// Run one drain pass if the API is reachable.
pub async fn drain<N: Network>(service: &OfflineService<N>) -> Result<(), String> {
    if !refresh_connectivity(service).await {
        return Err(format!(
            "API unreachable, {} operations still queued",
            service.get_network_status().queue_length
        ));
    }

    let report = service.drain().await;
    println!(
        "synced {}, retrying {}, dropped {}, deferred {}, remaining {}",
        report.synced, report.retried, report.dropped, report.deferred, report.remaining
    );
    for dropped in service.take_dropped_operations() {
        eprintln!(
            "dropped {:?} {} ({}): {}",
            dropped.operation.kind, dropped.operation.target, dropped.operation.id, dropped.reason
        );
    }
    Ok(())
}

/// Run the background daemon until ctrl-c.
pub async fn run<N: Network>(
    service: Arc<OfflineService<N>>,
    poll_interval: Duration,
    probe_interval: Duration,
) -> Result<(), String> {
    let (daemon, _trigger) = SyncDaemon::new(service.clone());
    let mut daemon = daemon
        .with_poll_interval(poll_interval)
        .with_probe_interval(probe_interval);

    let _subscription = service.on_connectivity_change(|online| {
        if online {
            log::info!("Back online");
        } else {
            log::warn!("Offline; changes will be queued");
        }
    });

    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await;
    Ok(())
}

/// Wipe queue and cache.
pub fn clear<N: Network>(service: &OfflineService<N>) -> Result<(), String> {
    service.clear_all();
    Ok(())
}
