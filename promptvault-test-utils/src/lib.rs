//! PromptVault Test Utilities
//!
//! Shared test infrastructure for the PromptVault workspace:
//! - Deterministic id generation
//! - A call-counting store wrapper for asserting cache hits
//! - Proptest generators for prompts and changesets
//! - Fixtures for common scenarios
//! - Assertions over `VaultError` variants

// Re-export the in-memory collaborators from their source crate
pub use promptvault_storage::{
    CachePolicy, EnvelopeStore, InMemoryKvBackend, InMemoryPromptStore, KvBackend, PromptSearch,
    PromptStore, ScanResult, SearchResult,
};

// Re-export core types for convenience
pub use promptvault_core::{
    CacheError, Clock, ConfigError, IdGenerator, ListQuery, ManualClock, NewPrompt, Prompt,
    PromptChangeset, PromptId, ScanRequest, SearchRequest, SortField, SortOrder, StorageError,
    TenantId, Timestamp, UsageEvent, ValidationError, VaultError, VaultResult, VersionEntry,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// ID GENERATION
// ============================================================================

/// Id generator handing out `00000000-0000-0000-0000-000000000001`, `...02`, ...
///
/// Ids are unique and ordered by issue, which keeps ledger assertions stable.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_uuid(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(u128::from(n))
    }
}

// ============================================================================
// COUNTING STORE
// ============================================================================

/// Wraps an [`InMemoryPromptStore`] and counts read calls.
///
/// Lets tests prove a read was served from cache: a fresh hit leaves every
/// counter unchanged.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryPromptStore,
    gets: AtomicUsize,
    scans: AtomicUsize,
    searches: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store, for seeding and failure injection.
    pub fn inner(&self) -> &InMemoryPromptStore {
        &self.inner
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Sum of all counted reads.
    pub fn read_calls(&self) -> usize {
        self.get_calls() + self.scan_calls() + self.search_calls()
    }

    pub fn reset_counts(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.scans.store(0, Ordering::SeqCst);
        self.searches.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl PromptStore for CountingStore {
    async fn get_by_id(
        &self,
        id: PromptId,
        tenant_id: Option<&TenantId>,
    ) -> VaultResult<Option<Prompt>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_id(id, tenant_id).await
    }

    async fn scan(&self, request: &ScanRequest) -> VaultResult<ScanResult> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan(request).await
    }

    async fn insert(&self, prompt: &Prompt) -> VaultResult<()> {
        self.inner.insert(prompt).await
    }

    async fn update(&self, prompt: &Prompt) -> VaultResult<()> {
        self.inner.update(prompt).await
    }

    async fn delete(&self, id: PromptId, tenant_id: &TenantId) -> VaultResult<()> {
        self.inner.delete(id, tenant_id).await
    }

    async fn distinct_tenants(&self) -> VaultResult<Vec<TenantId>> {
        self.inner.distinct_tenants().await
    }

    async fn append_version_entry(&self, entry: &VersionEntry) -> VaultResult<()> {
        self.inner.append_version_entry(entry).await
    }

    async fn list_version_entries(
        &self,
        prompt_id: PromptId,
        tenant_id: &TenantId,
        limit: usize,
    ) -> VaultResult<Vec<VersionEntry>> {
        self.inner
            .list_version_entries(prompt_id, tenant_id, limit)
            .await
    }

    async fn append_usage_event(&self, event: &UsageEvent) -> VaultResult<()> {
        self.inner.append_usage_event(event).await
    }
}

#[async_trait]
impl PromptSearch for CountingStore {
    async fn search(&self, request: &SearchRequest) -> VaultResult<SearchResult> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(request).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for PromptVault types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        "[a-z]{1,6}(-[a-z0-9]{1,4})?".prop_map(TenantId::new)
    }

    pub fn arb_prompt_id() -> impl Strategy<Value = PromptId> {
        any::<u128>().prop_map(|n| PromptId::new(Uuid::from_u128(n)))
    }

    /// A single tag, sometimes padded so normalization has something to do.
    pub fn arb_tag() -> impl Strategy<Value = String> {
        ("[a-zA-Z][a-zA-Z0-9_-]{0,11}", any::<bool>()).prop_map(|(tag, pad)| {
            if pad {
                format!("  {tag} ")
            } else {
                tag
            }
        })
    }

    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_tag(), 0..6)
    }

    /// Flat JSON object metadata, or none.
    pub fn arb_metadata() -> impl Strategy<Value = Option<serde_json::Value>> {
        prop::option::of(
            prop::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 0..4).prop_map(
                |map| {
                    serde_json::Value::Object(
                        map.into_iter()
                            .map(|(k, v)| (k, serde_json::Value::String(v)))
                            .collect(),
                    )
                },
            ),
        )
    }

    pub fn arb_new_prompt() -> impl Strategy<Value = NewPrompt> {
        (
            arb_tenant_id(),
            "[A-Za-z][A-Za-z0-9 ]{0,31}",
            "[A-Za-z0-9 .,!?]{0,120}",
            arb_tags(),
            arb_metadata(),
            "[a-z]{3,10}",
        )
            .prop_map(|(tenant_id, title, body, tags, metadata, created_by)| {
                let mut input = NewPrompt::new(tenant_id, title, body, created_by).with_tags(tags);
                input.metadata = metadata;
                input
            })
    }

    /// Changesets that always pass validation.
    pub fn arb_changeset() -> impl Strategy<Value = PromptChangeset> {
        (
            prop::option::of("[A-Za-z][A-Za-z0-9 ]{0,31}"),
            prop::option::of("[A-Za-z0-9 .,!?]{0,120}"),
            prop::option::of(arb_tags()),
            prop::option::of(arb_metadata()),
            prop::option::of(any::<bool>()),
            prop::option::of("[a-z]{3,10}"),
        )
            .prop_map(|(title, body, tags, metadata, archived, updated_by)| PromptChangeset {
                title,
                body,
                tags,
                metadata,
                archived,
                updated_by,
            })
    }

    pub fn arb_sort() -> impl Strategy<Value = (SortField, SortOrder)> {
        (
            prop_oneof![
                Just(SortField::UpdatedAt),
                Just(SortField::CreatedAt),
                Just(SortField::Title),
                Just(SortField::Version),
            ],
            prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)],
        )
    }

    /// List queries for one tenant with arbitrary optional dimensions.
    pub fn arb_list_query(tenant_id: TenantId) -> impl Strategy<Value = ListQuery> {
        (
            prop::option::of("[a-z]{1,8}"),
            prop::option::of(arb_tag()),
            prop::option::of(("[a-z]{1,6}", prop::option::of("[a-z0-9]{1,6}"))),
            arb_sort(),
            1u32..5,
            1u32..150,
        )
            .prop_map(move |(search, tag, metadata, (sort, order), page, page_size)| {
                let mut query = ListQuery::new(tenant_id.clone())
                    .sorted_by(sort, order)
                    .page(page, page_size);
                if let Some(search) = search {
                    query = query.with_search(search);
                }
                if let Some(tag) = tag {
                    query = query.with_tag(tag);
                }
                if let Some((key, value)) = metadata {
                    query = query.with_metadata(key, value);
                }
                query
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built inputs and collaborators for common scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};

    /// Fixed instant every manual clock starts from.
    pub fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
            .single()
            .unwrap_or(chrono::DateTime::UNIX_EPOCH)
    }

    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(epoch()))
    }

    /// Minimal valid creation input.
    pub fn new_prompt(tenant: &str, title: &str) -> NewPrompt {
        NewPrompt::new(tenant, title, format!("Body of {title}"), "alice")
    }

    /// Creation input with tags and a `team` metadata key.
    pub fn tagged_prompt(tenant: &str, title: &str, tags: &[&str], team: &str) -> NewPrompt {
        new_prompt(tenant, title)
            .with_tags(tags.iter().copied())
            .with_metadata(serde_json::json!({ "team": team }))
    }

    /// A fully materialized prompt at version 1, for tests that bypass the ledger.
    pub fn prompt_record(id: PromptId, tenant: &str, title: &str, at: Timestamp) -> Prompt {
        Prompt {
            id,
            tenant_id: TenantId::from(tenant),
            title: title.to_string(),
            body: format!("Body of {title}"),
            tags: Default::default(),
            metadata: None,
            version: 1,
            archived: false,
            created_at: at,
            updated_at: at,
            created_by: "alice".to_string(),
        }
    }

    /// Short fresh/stale windows measured in seconds.
    pub fn short_policy() -> CachePolicy {
        CachePolicy::new(
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(20),
        )
    }

    /// Envelope store over a fresh in-memory backend.
    pub fn memory_cache(clock: Arc<ManualClock>) -> (Arc<InMemoryKvBackend>, EnvelopeStore) {
        let backend = Arc::new(InMemoryKvBackend::new(clock.clone()));
        let cache = EnvelopeStore::new(backend.clone(), clock);
        (backend, cache)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over PromptVault results.

    use super::*;

    /// Unwrap an `Ok`, panicking with the error otherwise.
    #[track_caller]
    pub fn assert_ok<T>(result: VaultResult<T>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got error: {e}"),
        }
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: VaultResult<T>) -> StorageError {
        match result {
            Err(VaultError::Storage(e)) => e,
            other => panic!("Expected storage error, got {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: VaultResult<T>) -> ValidationError {
        match result {
            Err(VaultError::Validation(e)) => e,
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: VaultResult<T>) -> ConfigError {
        match result {
            Err(VaultError::Config(e)) => e,
            other => panic!("Expected config error, got {other:?}"),
        }
    }

    /// Versions must be contiguous from `expected_latest` downward.
    #[track_caller]
    pub fn assert_versions_descending(entries: &[VersionEntry], expected_latest: u32) {
        let versions: Vec<u32> = entries.iter().map(|e| e.version).collect();
        let expected: Vec<u32> = (1..=expected_latest).rev().take(entries.len()).collect();
        assert_eq!(versions, expected, "Ledger versions out of order");
    }
}
