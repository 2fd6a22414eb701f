//! Gated cache warming and the periodic warmer task.

mod support;

use std::time::Duration;

use promptvault_core::{prompt_cache_key, ListQuery, TenantId, WARM_GATE_KEY};
use promptvault_service::{cache_warmer_task, CacheWarmer, CacheWarmerConfig};
use promptvault_storage::KvBackend;
use promptvault_test_utils::assertions::assert_ok;
use promptvault_test_utils::fixtures;
use support::{eventually, Harness};
use tokio::sync::watch;

fn warmer_config() -> CacheWarmerConfig {
    CacheWarmerConfig {
        warm_interval: Duration::from_secs(900),
        records_per_tenant: 5,
        tick_interval: Duration::from_millis(10),
        enabled: true,
    }
}

#[tokio::test]
async fn test_warm_primes_prompts_and_default_list() {
    let h = Harness::new();
    let a = h.create(fixtures::new_prompt("t1", "A")).await;
    let b = h.create(fixtures::new_prompt("t1", "B")).await;
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());

    let report = warmer
        .maybe_warm(&[TenantId::from("t1")])
        .await
        .expect("gate open on first run");
    assert_eq!(report.tenants, 1);
    assert_eq!(report.records_warmed, 2);
    assert_eq!(report.lists_warmed, 1);
    assert_eq!(report.failures, 0);

    h.store.reset_counts();
    assert_ok(h.service.fetch_prompt(a.id, None).await);
    assert_ok(h.service.fetch_prompt(b.id, None).await);
    assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(h.store.read_calls(), 0);
}

#[tokio::test]
async fn test_warm_limits_records_per_tenant() {
    let h = Harness::new();
    let mut created = Vec::new();
    for n in 0..7 {
        h.advance_secs(1);
        created.push(h.create(fixtures::new_prompt("t1", &format!("P{n}"))).await);
    }
    let warmer = CacheWarmer::new(
        h.service.clone(),
        CacheWarmerConfig {
            records_per_tenant: 3,
            ..warmer_config()
        },
    );

    let report = warmer
        .maybe_warm(&[TenantId::from("t1")])
        .await
        .expect("gate open");
    assert_eq!(report.records_warmed, 3);

    // The most recently updated prompts are the ones warmed.
    for prompt in &created[4..] {
        assert!(h.has_key(&prompt_cache_key(prompt.id)).await);
    }
    assert!(!h.has_key(&prompt_cache_key(created[0].id)).await);
}

#[tokio::test]
async fn test_gate_blocks_second_run_within_interval() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());
    let tenants = [TenantId::from("t1")];

    assert!(warmer.maybe_warm(&tenants).await.is_some());
    h.advance_secs(899);
    assert!(warmer.maybe_warm(&tenants).await.is_none());
    h.advance_secs(1);
    assert!(warmer.maybe_warm(&tenants).await.is_some());

    let snap = warmer.metrics().snapshot();
    assert_eq!(snap.warm_runs, 2);
    assert_eq!(snap.gate_skips, 1);
}

#[tokio::test]
async fn test_gate_records_last_run_millis() {
    let h = Harness::new();
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());

    assert!(warmer.maybe_warm(&[]).await.is_some());
    let raw = assert_ok(h.backend.get(WARM_GATE_KEY).await.map_err(Into::into))
        .expect("gate written");
    let millis: i64 = String::from_utf8(raw)
        .expect("utf8")
        .parse()
        .expect("millis");
    assert_eq!(millis, h.now().timestamp_millis());
}

#[tokio::test]
async fn test_unreadable_gate_skips_run() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());
    h.backend.set_unavailable(true);

    assert!(warmer.maybe_warm(&[TenantId::from("t1")]).await.is_none());
    assert_eq!(warmer.metrics().snapshot().gate_skips, 1);
}

#[tokio::test]
async fn test_disabled_warmer_never_runs() {
    let h = Harness::new();
    let warmer = CacheWarmer::new(
        h.service.clone(),
        CacheWarmerConfig {
            enabled: false,
            ..warmer_config()
        },
    );

    assert!(warmer.maybe_warm_all().await.is_none());
    assert!(!h.has_key(WARM_GATE_KEY).await);
}

#[tokio::test]
async fn test_warm_all_covers_every_tenant() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;
    h.create(fixtures::new_prompt("t2", "B")).await;
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());

    let report = warmer.maybe_warm_all().await.expect("gate open");
    assert_eq!(report.tenants, 2);
    assert_eq!(report.lists_warmed, 2);
}

#[tokio::test]
async fn test_store_failure_is_counted_not_raised() {
    let h = Harness::new();
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());
    h.store.inner().set_unavailable(true);

    let report = warmer
        .maybe_warm(&[TenantId::from("t1")])
        .await
        .expect("gate open");
    assert_eq!(report.records_warmed, 0);
    assert_eq!(report.failures, 2);
    assert_eq!(warmer.metrics().snapshot().warm_errors, 2);
}

#[tokio::test]
async fn test_trigger_runs_detached() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());

    warmer.trigger(vec![TenantId::from("t1")]);

    let metrics = warmer.metrics();
    let metrics = &metrics;
    assert!(eventually(move || async move { metrics.snapshot().warm_runs == 1 }).await);
}

#[tokio::test]
async fn test_task_warms_once_then_stops_on_shutdown() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;
    let warmer = CacheWarmer::new(h.service.clone(), warmer_config());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(cache_warmer_task(warmer, shutdown_rx));
    tokio::time::sleep(Duration::from_millis(60)).await;
    shutdown_tx.send(true).expect("task alive");

    let metrics = handle.await.expect("task completes");
    let snap = metrics.snapshot();
    // The manual clock never moves, so only the first tick passes the gate.
    assert_eq!(snap.warm_runs, 1);
    assert!(snap.gate_skips >= 1);
    assert_eq!(snap.records_warmed, 1);
}
