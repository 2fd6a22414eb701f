//! Stale-while-revalidate behavior of the list and single-prompt read paths.

mod support;

use promptvault_core::{prompt_cache_key, ListPage, ListQuery, PromptId, SortField, SortOrder, TenantId};
use promptvault_test_utils::assertions::assert_ok;
use promptvault_test_utils::fixtures;
use support::{eventually, Harness};
use uuid::Uuid;

#[tokio::test]
async fn test_fresh_list_hit_skips_store() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "First")).await;
    h.create(fixtures::new_prompt("t1", "Second")).await;

    let first = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(first.total, 2);
    assert_eq!(h.store.scan_calls(), 1);

    let second = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(second, first);
    assert_eq!(h.store.scan_calls(), 1);

    let metrics = h.service.metrics();
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.fresh_hits, 1);
}

#[tokio::test]
async fn test_stale_list_is_served_then_rebuilt() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "First")).await;
    let first = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(first.items.len(), 1);

    let hidden = fixtures::prompt_record(PromptId::new(Uuid::from_u128(900)), "t1", "Hidden", h.now());
    h.insert_behind_cache(&hidden).await;

    // Past the 30s fresh window, inside the 120s stale window.
    h.advance_secs(31);
    let stale = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(stale.items.len(), 1);
    assert_eq!(h.service.metrics().stale_hits, 1);
    assert_eq!(h.service.metrics().background_rebuilds, 1);

    let key = ListQuery::new("t1").normalized(100).cache_key();
    let (cache, key) = (h.service.cache(), key.as_str());
    assert!(
        eventually(move || async move {
            matches!(
                cache.get::<ListPage>(key).await,
                Ok(Some(read)) if read.payload.total == 2 && read.freshness.is_fresh()
            )
        })
        .await
    );

    // The rebuilt entry is fresh and carries the new row.
    let rebuilt = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(rebuilt.total, 2);
    assert_eq!(h.store.scan_calls(), 2);
}

#[tokio::test]
async fn test_list_entry_absent_after_stale_window() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "First")).await;
    assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);

    // fresh (30s) + stale (120s)
    h.advance_secs(150);
    assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);

    let metrics = h.service.metrics();
    assert_eq!(metrics.stale_hits, 0);
    assert_eq!(metrics.misses, 2);
    assert_eq!(metrics.background_rebuilds, 0);
    assert_eq!(h.store.scan_calls(), 2);
}

#[tokio::test]
async fn test_list_invalidation_is_tenant_scoped() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;
    h.create(fixtures::new_prompt("t2", "B")).await;
    assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_ok(h.service.list_prompts(ListQuery::new("t2")).await);
    assert_eq!(h.store.scan_calls(), 2);

    let report = h
        .service
        .invalidate_tenant_list_cache(&TenantId::from("t1"))
        .await;
    assert_eq!(report.entries_removed, 1);

    assert_ok(h.service.list_prompts(ListQuery::new("t2")).await);
    assert_eq!(h.store.scan_calls(), 2);
    assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(h.store.scan_calls(), 3);
}

#[tokio::test]
async fn test_parameter_order_hits_same_entry() {
    let h = Harness::new();
    h.create(fixtures::tagged_prompt("t1", "A", &["ops"], "core")).await;

    let a = ListQuery::new("t1")
        .with_tag("ops")
        .with_metadata("team", Some("core".to_string()))
        .sorted_by(SortField::Title, SortOrder::Asc);
    let b = ListQuery::new("t1")
        .sorted_by(SortField::Title, SortOrder::Asc)
        .with_metadata("team", Some("core".to_string()))
        .with_tag("ops");

    let first = assert_ok(h.service.list_prompts(a).await);
    let second = assert_ok(h.service.list_prompts(b).await);
    assert_eq!(first, second);
    assert_eq!(first.total, 1);
    assert_eq!(h.store.scan_calls(), 1);
}

#[tokio::test]
async fn test_oversized_page_is_clamped_before_keying() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;

    let page = assert_ok(h.service.list_prompts(ListQuery::new("t1").page(0, 5000)).await);
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 100);

    // Same normalized query, so a fresh hit.
    assert_ok(h.service.list_prompts(ListQuery::new("t1").page(1, 100)).await);
    assert_eq!(h.store.scan_calls(), 1);
}

#[tokio::test]
async fn test_search_list_uses_search_and_search_tag() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "Hello world")).await;
    h.create(fixtures::new_prompt("t1", "Goodbye")).await;

    let query = ListQuery::new("t1").with_search("hello");
    let page = assert_ok(h.service.list_prompts(query.clone()).await);
    assert_eq!(page.total, 1);
    assert!(!page.items[0].highlights.is_empty());
    assert_eq!(h.store.search_calls(), 1);
    assert_eq!(h.store.scan_calls(), 0);

    let report = h
        .service
        .invalidate_tenant_search_cache(&TenantId::from("t1"))
        .await;
    assert_eq!(report.entries_removed, 1);

    assert_ok(h.service.list_prompts(query).await);
    assert_eq!(h.store.search_calls(), 2);
}

#[tokio::test]
async fn test_archived_prompts_never_listed() {
    let h = Harness::new();
    let kept = h.create(fixtures::new_prompt("t1", "Kept")).await;
    let gone = h.create(fixtures::new_prompt("t1", "Gone")).await;

    assert_ok(
        h.service
            .update_prompt(&gone, promptvault_core::PromptChangeset::new().archived(true))
            .await,
    );

    let page = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].prompt.id, kept.id);
}

#[tokio::test]
async fn test_archived_prompt_leaves_cached_filtered_lists() {
    let h = Harness::new();
    let gone = h
        .create(fixtures::tagged_prompt("t1", "Gone", &["ops"], "core"))
        .await;
    let kept = h
        .create(fixtures::tagged_prompt("t1", "Kept", &["ops"], "core"))
        .await;

    let by_tag = ListQuery::new("t1").with_tag("ops");
    let by_metadata = ListQuery::new("t1").with_metadata("team", Some("core".to_string()));
    for query in [&by_tag, &by_metadata] {
        let page = assert_ok(h.service.list_prompts(query.clone()).await);
        assert_eq!(page.total, 2);
    }
    assert_eq!(h.store.scan_calls(), 2);

    assert_ok(
        h.service
            .update_prompt(&gone, promptvault_core::PromptChangeset::new().archived(true))
            .await,
    );

    for query in [&by_tag, &by_metadata] {
        let page = assert_ok(h.service.list_prompts(query.clone()).await);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].prompt.id, kept.id);
    }
    assert_eq!(h.store.scan_calls(), 4);
}

#[tokio::test]
async fn test_fetch_prompt_fresh_hit_skips_store() {
    let h = Harness::new();
    let prompt = h.create(fixtures::new_prompt("t1", "A")).await;
    let tenant = TenantId::from("t1");

    let first = assert_ok(h.service.fetch_prompt(prompt.id, Some(&tenant)).await);
    assert_eq!(first.as_ref(), Some(&prompt));
    assert_eq!(h.store.get_calls(), 1);

    let second = assert_ok(h.service.fetch_prompt(prompt.id, Some(&tenant)).await);
    assert_eq!(second, first);
    assert_eq!(h.store.get_calls(), 1);
}

#[tokio::test]
async fn test_cached_prompt_hidden_from_other_tenant() {
    let h = Harness::new();
    let prompt = h.create(fixtures::new_prompt("t1", "A")).await;
    assert_ok(h.service.fetch_prompt(prompt.id, None).await);

    let other = TenantId::from("t2");
    let fetched = assert_ok(h.service.fetch_prompt(prompt.id, Some(&other)).await);
    assert!(fetched.is_none());
    assert_eq!(h.store.get_calls(), 1);
}

#[tokio::test]
async fn test_missing_prompt_is_not_cached() {
    let h = Harness::new();
    let id = PromptId::new(Uuid::from_u128(42));

    assert!(assert_ok(h.service.fetch_prompt(id, None).await).is_none());
    assert!(assert_ok(h.service.fetch_prompt(id, None).await).is_none());
    assert_eq!(h.store.get_calls(), 2);
    assert!(!h.has_key(&prompt_cache_key(id)).await);
}

#[tokio::test]
async fn test_stale_prompt_rebuild_evicts_deleted_row() {
    let h = Harness::new();
    let prompt = h.create(fixtures::new_prompt("t1", "A")).await;
    assert_ok(h.service.fetch_prompt(prompt.id, None).await);

    {
        use promptvault_storage::PromptStore as _;
        assert_ok(h.store.inner().delete(prompt.id, &prompt.tenant_id).await);
    }

    // Past the 60s fresh window.
    h.advance_secs(61);
    let stale = assert_ok(h.service.fetch_prompt(prompt.id, None).await);
    assert_eq!(stale.map(|p| p.id), Some(prompt.id));

    let key = prompt_cache_key(prompt.id);
    let (h, key) = (&h, key.as_str());
    assert!(eventually(move || async move { !h.has_key(key).await }).await);
    assert_eq!(h.service.metrics().rebuild_failures, 0);
}

#[tokio::test]
async fn test_update_invalidates_prompt_entry() {
    let h = Harness::new();
    let prompt = h.create(fixtures::new_prompt("t1", "Old")).await;
    assert_ok(h.service.fetch_prompt(prompt.id, None).await);

    assert_ok(
        h.service
            .update_prompt(&prompt, promptvault_core::PromptChangeset::new().title("New"))
            .await,
    );

    let fetched = assert_ok(h.service.fetch_prompt(prompt.id, None).await);
    assert_eq!(fetched.map(|p| p.title), Some("New".to_string()));
    assert_eq!(h.store.get_calls(), 2);
}

#[tokio::test]
async fn test_failed_rebuild_is_counted_and_keeps_serving() {
    let h = Harness::new();
    h.create(fixtures::new_prompt("t1", "A")).await;
    let first = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);

    h.store.inner().set_unavailable(true);
    h.advance_secs(31);
    let stale = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(stale, first);

    let service = &h.service;
    assert!(eventually(move || async move { service.metrics().rebuild_failures == 1 }).await);
}

#[tokio::test]
async fn test_unavailable_cache_degrades_to_store() {
    let h = Harness::new();
    let prompt = h.create(fixtures::new_prompt("t1", "A")).await;
    h.backend.set_unavailable(true);

    let page = assert_ok(h.service.list_prompts(ListQuery::new("t1")).await);
    assert_eq!(page.total, 1);
    let fetched = assert_ok(h.service.fetch_prompt(prompt.id, None).await);
    assert_eq!(fetched.map(|p| p.id), Some(prompt.id));

    // Mutations still succeed; their invalidation failures are swallowed.
    assert_ok(
        h.service
            .update_prompt(&prompt, promptvault_core::PromptChangeset::new().body("changed"))
            .await,
    );

    let metrics = h.service.metrics();
    assert!(metrics.degraded_cache_errors >= 4);
    assert_eq!(metrics.misses, 2);
    assert_eq!(metrics.fresh_hits, 0);
}

#[tokio::test]
async fn test_store_errors_reach_the_caller() {
    let h = Harness::new();
    h.store.inner().set_unavailable(true);

    let result = h.service.list_prompts(ListQuery::new("t1")).await;
    promptvault_test_utils::assertions::assert_storage_error(result);
}
