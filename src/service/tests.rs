//! Facade-level tests: read/write paths, persistence and connectivity.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::api::types::{HttpMethod, NetworkResponse};
use crate::connectivity::{ConnectionInfo, EffectiveType};
use crate::error::{NetworkError, OfflineError};
use crate::notify::{Notification, SyncStatus};
use crate::service::RequestOptions;
use crate::storage::{MemoryStorage, Storage, CACHE_KEY, LEGACY_KEY, QUEUE_KEY};
use crate::sync::queue::OperationKind;
use crate::testing::{t0, test_config, Harness};

fn ms(n: i64) -> chrono::Duration {
    chrono::Duration::milliseconds(n)
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_queue_survives_reload_in_order() {
    let h = Harness::offline();
    let ids: Vec<String> = ["/api/a", "/api/b", "/api/c"]
        .iter()
        .map(|t| h.service.queue_mutation(OperationKind::Create, t, Some(json!({"t": t}))))
        .collect();
    let before = h.service.queued_operations();

    // Simulated page reload: a fresh service over the same storage
    let reloaded = Harness::with_storage(h.storage.clone(), false);
    let after = reloaded.service.queued_operations();

    assert_eq!(after, before);
    let after_ids: Vec<String> = after.into_iter().map(|op| op.id).collect();
    assert_eq!(after_ids, ids);
}

#[tokio::test]
async fn test_cache_survives_reload() {
    let h = Harness::online();
    h.service.cache_domain_object("event:7", json!({"title": "Town hall"}));

    let reloaded = Harness::with_storage(h.storage.clone(), true);
    reloaded.clock.set(t0() + chrono::Duration::hours(23));
    assert_eq!(
        reloaded.service.get_cached("event:7"),
        Some(json!({"title": "Town hall"}))
    );
    reloaded.clock.set(t0() + chrono::Duration::hours(25));
    assert!(reloaded.service.get_cached("event:7").is_none());
}

#[tokio::test]
async fn test_persistence_failure_keeps_memory_state() {
    let h = Harness::offline();
    h.storage.set_fail_writes(true);

    h.service.queue_mutation(OperationKind::Create, "/api/a", Some(json!({})));
    h.service.cache("k", json!(1), Duration::from_secs(60));

    let status = h.service.get_network_status();
    assert_eq!(status.queue_length, 1);
    assert_eq!(status.cache_size, 1);
    assert_eq!(h.service.get_cached("k"), Some(json!(1)));
    assert!(h.storage.load(QUEUE_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_legacy_record_is_migrated() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .save(
            LEGACY_KEY,
            r#"{
                "queue": [{
                    "id": "1772352000000-deadbeef",
                    "kind": "UPDATE",
                    "target": "/api/tasks/5",
                    "payload": {"done": true},
                    "enqueuedAt": "2026-03-01T08:00:00Z",
                    "attempts": 1
                }],
                "cache": {
                    "/api/projects": {"data": [1, 2], "timestamp": "2026-03-01T08:00:00Z", "maxAge": 300000}
                }
            }"#,
        )
        .unwrap();

    let h = Harness::with_storage(storage.clone(), false);

    let ops = h.service.queued_operations();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OperationKind::Update);
    assert_eq!(ops[0].attempts, 1);
    assert_eq!(h.service.get_cached("/api/projects"), Some(json!([1, 2])));

    assert!(storage.load(LEGACY_KEY).unwrap().is_none());
    assert!(storage.load(QUEUE_KEY).unwrap().is_some());
    assert!(storage.load(CACHE_KEY).unwrap().is_some());
}

#[tokio::test]
async fn test_corrupt_storage_starts_empty() {
    let storage = Arc::new(MemoryStorage::new());
    storage.save(QUEUE_KEY, "not json").unwrap();
    storage.save(CACHE_KEY, "[]").unwrap();

    let h = Harness::with_storage(storage, true);
    let status = h.service.get_network_status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.cache_size, 0);
}

#[tokio::test]
async fn test_clear_all_wipes_memory_and_storage() {
    let h = Harness::offline();
    h.service.queue_mutation(OperationKind::Delete, "/api/a/1", None);
    h.service.cache("k", json!(1), Duration::from_secs(60));

    h.service.clear_all();

    let status = h.service.get_network_status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.cache_size, 0);
    assert!(h.storage.keys().is_empty());
}

// ── Cache staleness ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_stale_entry_is_evicted_on_read() {
    let h = Harness::online();
    h.service.cache("k", json!("v"), Duration::from_millis(100));
    assert_eq!(h.service.get_cached("k"), Some(json!("v")));

    h.clock.advance(ms(150));
    assert!(h.service.get_cached("k").is_none());
    assert_eq!(h.service.get_network_status().cache_size, 0);
    assert!(h.service.get_cached("k").is_none());

    // Eviction was persisted too
    let reloaded = Harness::with_storage(h.storage.clone(), true);
    assert_eq!(reloaded.service.get_network_status().cache_size, 0);
}

#[tokio::test]
async fn test_cache_bound_evicts_lru() {
    let mut config = test_config();
    config.cache_max_entries = 2;
    let h = Harness::with_config(Arc::new(MemoryStorage::new()), &config);

    h.service.cache("a", json!(1), Duration::from_secs(60));
    h.service.cache("b", json!(2), Duration::from_secs(60));
    let _ = h.service.get_cached("a");
    h.service.cache("c", json!(3), Duration::from_secs(60));

    assert_eq!(h.service.get_network_status().cache_size, 2);
    assert!(h.service.get_cached("b").is_none());
    assert_eq!(h.service.get_cached("a"), Some(json!(1)));
}

// ── Request path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_online_get_is_cached() {
    let h = Harness::online();
    h.network()
        .script("/api/projects", Ok(NetworkResponse::ok(json!([{"id": 42}]))));

    let value = h
        .service
        .request("/api/projects", RequestOptions::get())
        .await
        .unwrap();
    assert_eq!(value, json!([{"id": 42}]));
    assert_eq!(h.service.get_cached("/api/projects"), Some(json!([{"id": 42}])));

    // Network default max-age is five minutes
    h.clock.advance(chrono::Duration::minutes(6));
    assert!(h.service.get_cached("/api/projects").is_none());
}

#[tokio::test]
async fn test_online_http_error_is_surfaced_not_queued() {
    let h = Harness::online();
    h.network()
        .script("/api/donations", Ok(NetworkResponse::new(400, json!({"error": "amount"}))));

    let err = h
        .service
        .request(
            "/api/donations",
            RequestOptions::with_method(HttpMethod::Post, Some(json!({"amount": -1}))),
        )
        .await
        .unwrap_err();

    match err {
        OfflineError::Http { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, r#"{"error":"amount"}"#);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.service.get_network_status().queue_length, 0);
}

#[tokio::test]
async fn test_offline_read_served_from_cache_without_network() {
    let h = Harness::offline();
    h.service.cache("/api/x", json!({"data": 1}), Duration::from_secs(300));

    let value = h.service.request("/api/x", RequestOptions::get()).await.unwrap();
    assert_eq!(value, json!({"data": 1}));
    assert_eq!(h.network().call_count(), 0);
    assert_eq!(h.service.get_network_status().queue_length, 0);
}

#[tokio::test]
async fn test_offline_read_miss_is_queued() {
    let h = Harness::offline();

    let err = h
        .service
        .request("/api/y", RequestOptions::get())
        .await
        .unwrap_err();

    let id = err.queued_id().expect("queued error").to_string();
    assert!(err.to_string().contains("no cached data available"));
    let ops = h.service.queued_operations();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].id, id);
    assert_eq!(ops[0].kind, OperationKind::Read);
    assert_eq!(h.network().call_count(), 0);
}

#[tokio::test]
async fn test_offline_mutation_is_queued_even_with_cache() {
    let h = Harness::offline();
    h.service.cache("/api/tasks/1", json!({"done": false}), Duration::from_secs(300));

    let err = h
        .service
        .request(
            "/api/tasks/1",
            RequestOptions::with_method(HttpMethod::Put, Some(json!({"done": true}))),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OfflineError::Queued { .. }));
    let ops = h.service.queued_operations();
    assert_eq!(ops[0].kind, OperationKind::Update);
    assert_eq!(ops[0].payload, Some(json!({"done": true})));
}

#[tokio::test]
async fn test_transport_failure_while_online_falls_back() {
    let h = Harness::online();
    h.network().fail_with_transport();
    h.service.cache("/api/leaderboard", json!([3, 2, 1]), Duration::from_secs(300));

    let value = h
        .service
        .request("/api/leaderboard", RequestOptions::get())
        .await
        .unwrap();
    assert_eq!(value, json!([3, 2, 1]));

    let err = h
        .service
        .request(
            "/api/votes",
            RequestOptions::with_method(HttpMethod::Post, Some(json!({}))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::Queued { .. }));
    assert_eq!(h.service.get_network_status().queue_length, 1);
}

#[tokio::test]
async fn test_invalid_target_is_not_queued() {
    let h = Harness::online();
    h.network()
        .set_default(Err(NetworkError::InvalidTarget("api/x".into())));

    let err = h.service.request("api/x", RequestOptions::get()).await.unwrap_err();
    assert!(matches!(err, OfflineError::Network(NetworkError::InvalidTarget(_))));
    assert_eq!(h.service.get_network_status().queue_length, 0);
}

#[tokio::test]
async fn test_slow_connection_prefers_cache() {
    let h = Harness::online();
    h.service.cache("/api/quiz", json!({"q": 1}), Duration::from_secs(300));
    h.service
        .set_connection_info(Some(ConnectionInfo::new(EffectiveType::ThreeG, 0.8)));

    let value = h.service.request("/api/quiz", RequestOptions::get()).await.unwrap();
    assert_eq!(value, json!({"q": 1}));
    assert_eq!(h.network().call_count(), 0);
    assert!(h.service.get_network_status().is_slow);

    // Uncached reads still go to the network
    h.service.request("/api/other", RequestOptions::get()).await.unwrap();
    assert_eq!(h.network().call_count(), 1);
}

// ── Connectivity and status ──────────────────────────────────────────────

#[tokio::test]
async fn test_listeners_see_transitions_until_unsubscribed() {
    let h = Harness::online();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = h
        .service
        .on_connectivity_change(move |online| sink.lock().unwrap().push(online));

    assert!(h.service.set_online(false).await);
    assert!(!h.service.set_online(false).await);
    assert!(h.service.set_online(true).await);
    sub.unsubscribe();
    h.service.set_online(false).await;

    assert_eq!(*seen.lock().unwrap(), vec![false, true]);
}

#[tokio::test]
async fn test_status_labels_follow_queue() {
    let h = Harness::offline();
    assert_eq!(h.service.get_network_status().sync_status(), SyncStatus::Offline(0));

    for target in ["/a", "/b", "/c"] {
        h.service.queue_mutation(OperationKind::Create, target, Some(json!({})));
    }
    let status = h.service.get_network_status();
    assert!(!status.is_online);
    assert_eq!(status.sync_status().label(), "Offline (3 queued)");

    h.network().fail_with_status(500);
    h.service.set_online(true).await;
    assert_eq!(
        h.service.get_network_status().sync_status().label(),
        "3 changes pending sync"
    );
}

#[tokio::test]
async fn test_vote_queued_offline_syncs_on_reconnect() {
    let h = Harness::offline();

    h.service.queue_mutation(
        OperationKind::Create,
        "/api/projects/42/vote",
        Some(json!({"amount": 50})),
    );
    assert_eq!(h.service.get_network_status().queue_length, 1);
    assert_eq!(h.notifier.count_queued(), 1);

    h.network()
        .set_default(Ok(NetworkResponse::new(200, serde_json::Value::Null)));
    h.service.set_online(true).await;

    assert_eq!(h.service.get_network_status().queue_length, 0);
    let calls = h.network().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Post);
    assert_eq!(calls[0].body, Some(json!({"amount": 50})));

    assert_eq!(h.notifier.count_synced(), 1);
    assert!(h
        .notifier
        .notifications()
        .contains(&Notification::Synced { count: 1 }));

    // A later empty drain does not repeat the toast
    h.service.drain().await;
    assert_eq!(h.notifier.count_synced(), 1);
}
