//! Cache-transparent prompt service.
//!
//! Callers read and write prompts through [`PromptService`] unchanged; the
//! cache is consulted and maintained behind their back.
//!
//! # Read path
//!
//! Every read classifies its cache entry:
//!
//! - fresh: served with no store access;
//! - stale: served immediately, and a detached task recomputes the payload
//!   and writes it back under the same key and tags;
//! - absent: computed synchronously from the store (or search), written to
//!   the cache, then served.
//!
//! # Failure policy
//!
//! The cache is an optimization. Cache errors are logged, counted, and
//! treated as misses; only store errors reach the caller.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use promptvault_core::{
    list_tags, normalize_tags, prompt_cache_key, prompt_tag, prompt_tags, tenant_list_tag,
    tenant_search_tag, Clock, IdGenerator, ListPage, ListQuery, NewPrompt, PaginatedResult,
    Prompt, PromptChangeset, PromptHit, PromptId, TenantId, UsageEvent, UsageEventId,
    VaultError, VaultResult, VersionEntry,
};
use promptvault_storage::{
    CacheMetrics, CacheMetricsSnapshot, CachePolicy, CacheRead, EnvelopeStore, Freshness,
    InvalidationReport, KvBackend, PromptSearch, PromptStore, VersionLedger,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::ServiceConfig;

/// Outcome of a bulk mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    /// Rows that changed, in their post-mutation state.
    pub updated: Vec<Prompt>,
    /// How many of `updated` got a new version.
    pub version_bumps: usize,
    /// Rows whose changeset was a no-op.
    pub unchanged: usize,
    /// Ids that do not exist for the tenant.
    pub skipped: Vec<PromptId>,
}

/// Per-row edit applied by a bulk operation.
enum BulkEdit<'a> {
    Changeset(&'a PromptChangeset),
    Tags {
        add: &'a BTreeSet<String>,
        remove: &'a BTreeSet<String>,
        updated_by: Option<&'a str>,
    },
}

impl BulkEdit<'_> {
    fn changeset_for(&self, prompt: &Prompt) -> PromptChangeset {
        match self {
            Self::Changeset(changeset) => (*changeset).clone(),
            Self::Tags {
                add,
                remove,
                updated_by,
            } => {
                let tags: Vec<String> = prompt
                    .tags
                    .iter()
                    .chain(add.iter())
                    .filter(|t| !remove.contains(*t))
                    .cloned()
                    .collect();
                let mut changeset = PromptChangeset::new().tags(tags);
                changeset.updated_by = updated_by.map(str::to_string);
                changeset
            }
        }
    }
}

/// Prompt service with a stale-while-revalidate cache in front of the store.
///
/// Cheap to clone: every field is shared.
#[derive(Clone)]
pub struct PromptService {
    store: Arc<dyn PromptStore>,
    search: Arc<dyn PromptSearch>,
    cache: EnvelopeStore,
    ledger: VersionLedger,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ServiceConfig,
    metrics: Arc<CacheMetrics>,
}

impl std::fmt::Debug for PromptService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptService")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PromptService {
    /// Create a service over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation.
    pub fn new(
        store: Arc<dyn PromptStore>,
        search: Arc<dyn PromptSearch>,
        backend: Arc<dyn KvBackend>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: ServiceConfig,
    ) -> VaultResult<Self> {
        config.validate()?;
        let cache = EnvelopeStore::new(backend, clock.clone())
            .with_scan_page_size(config.invalidation_scan_page_size);
        let ledger = VersionLedger::new(store.clone(), ids.clone(), clock.clone());
        Ok(Self {
            store,
            search,
            cache,
            ledger,
            clock,
            ids,
            config,
            metrics: Arc::new(CacheMetrics::new()),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PromptStore> {
        &self.store
    }

    pub fn cache(&self) -> &EnvelopeStore {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Snapshot of the cache counters.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    // ========================================================================
    // LIST READ PATH
    // ========================================================================

    /// List prompts for a query, served through the list cache.
    pub async fn list_prompts(&self, query: ListQuery) -> VaultResult<ListPage> {
        let query = query.normalized(self.config.max_page_size);
        let key = query.cache_key();

        if let Some(read) = self.cache_lookup::<ListPage>(key.as_str()).await {
            if read.freshness.is_stale() {
                self.schedule_list_rebuild(query);
            }
            return Ok(read.payload);
        }

        let page = self.compute_list(&query).await?;
        self.cache_put(key.as_str(), &page, self.config.list_cache, &list_tags(&query))
            .await;
        Ok(page)
    }

    async fn compute_list(&self, query: &ListQuery) -> VaultResult<ListPage> {
        if let Some(request) = query.search_request() {
            let result = self.search.search(&request).await?;
            return Ok(PaginatedResult {
                items: result.hits,
                total: result.total,
                page: query.page,
                page_size: query.page_size,
            });
        }

        let result = self.store.scan(&query.scan_request()).await?;
        Ok(PaginatedResult {
            items: result.rows.into_iter().map(PromptHit::plain).collect(),
            total: result.total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    fn schedule_list_rebuild(&self, query: ListQuery) {
        let this = self.clone();
        let key = query.cache_key();
        self.spawn_rebuild(key.to_string(), async move {
            let page = this.compute_list(&query).await?;
            this.cache_put(key.as_str(), &page, this.config.list_cache, &list_tags(&query))
                .await;
            Ok::<(), VaultError>(())
        });
    }

    // ========================================================================
    // SINGLE-PROMPT READ PATH
    // ========================================================================

    /// Fetch one prompt, served through the single-prompt cache.
    ///
    /// `Ok(None)` when the prompt does not exist, or belongs to a tenant
    /// other than `tenant_id`.
    pub async fn fetch_prompt(
        &self,
        id: PromptId,
        tenant_id: Option<&TenantId>,
    ) -> VaultResult<Option<Prompt>> {
        let key = prompt_cache_key(id);

        if let Some(read) = self.cache_lookup::<Prompt>(&key).await {
            if read.freshness.is_stale() {
                self.schedule_prompt_rebuild(id);
            }
            let prompt = read.payload;
            if let Some(tenant_id) = tenant_id {
                if &prompt.tenant_id != tenant_id {
                    debug!(prompt_id = %id, tenant_id = %tenant_id, "Cached prompt belongs to another tenant");
                    return Ok(None);
                }
            }
            return Ok(Some(prompt));
        }

        let prompt = self.store.get_by_id(id, tenant_id).await?;
        if let Some(prompt) = &prompt {
            self.cache_put(&key, prompt, self.config.prompt_cache, &prompt_tags(prompt))
                .await;
        }
        Ok(prompt)
    }

    fn schedule_prompt_rebuild(&self, id: PromptId) {
        let this = self.clone();
        self.spawn_rebuild(prompt_cache_key(id), async move {
            let key = prompt_cache_key(id);
            match this.store.get_by_id(id, None).await? {
                Some(prompt) => {
                    this.cache_put(&key, &prompt, this.config.prompt_cache, &prompt_tags(&prompt))
                        .await;
                }
                None => {
                    if let Err(e) = this.cache.delete(&key).await {
                        this.record_cache_error("delete", &key, &e);
                    }
                }
            }
            Ok::<(), VaultError>(())
        });
    }

    /// Evict and repopulate the single-prompt entry from `prompt`.
    ///
    /// Returns whether the entry was written.
    pub async fn refresh_prompt_entry(&self, prompt: &Prompt) -> bool {
        let key = prompt_cache_key(prompt.id);
        if let Err(e) = self.cache.delete(&key).await {
            self.record_cache_error("delete", &key, &e);
            return false;
        }
        match self
            .cache
            .put(&key, prompt, self.config.prompt_cache, &prompt_tags(prompt))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.record_cache_error("put", &key, &e);
                false
            }
        }
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Create a prompt at version 1.
    pub async fn create_prompt(&self, input: NewPrompt) -> VaultResult<Prompt> {
        let prompt = self.ledger.create(input).await?;
        self.invalidate(&tenant_list_tag(&prompt.tenant_id)).await;
        Ok(prompt)
    }

    /// Apply `changeset` to `existing` and invalidate what it affects.
    pub async fn update_prompt(
        &self,
        existing: &Prompt,
        changeset: PromptChangeset,
    ) -> VaultResult<Prompt> {
        let outcome = self.ledger.apply_mutation(existing, &changeset).await?;
        if outcome.changed {
            self.invalidate_prompt(&outcome.prompt).await;
        }
        Ok(outcome.prompt)
    }

    /// Delete a prompt (and by cascade its ledger).
    pub async fn delete_prompt(&self, prompt: &Prompt) -> VaultResult<()> {
        self.store.delete(prompt.id, &prompt.tenant_id).await?;
        self.invalidate_prompt(prompt).await;
        Ok(())
    }

    /// Apply one changeset per id. Missing ids are reported, not failed.
    pub async fn bulk_update_prompts(
        &self,
        tenant_id: &TenantId,
        updates: &[(PromptId, PromptChangeset)],
    ) -> VaultResult<BulkReport> {
        let edits = updates
            .iter()
            .map(|(id, changeset)| (*id, BulkEdit::Changeset(changeset)));
        self.apply_bulk(tenant_id, edits).await
    }

    /// Add and remove tags across many prompts.
    ///
    /// A tag in both `add` and `remove` ends up removed.
    pub async fn bulk_edit_tags(
        &self,
        tenant_id: &TenantId,
        ids: &[PromptId],
        add: &[String],
        remove: &[String],
        updated_by: Option<&str>,
    ) -> VaultResult<BulkReport> {
        let add = normalize_tags(add);
        let remove = normalize_tags(remove);
        let edits = ids.iter().map(|id| {
            (
                *id,
                BulkEdit::Tags {
                    add: &add,
                    remove: &remove,
                    updated_by,
                },
            )
        });
        self.apply_bulk(tenant_id, edits).await
    }

    async fn apply_bulk<'a, I>(&self, tenant_id: &TenantId, edits: I) -> VaultResult<BulkReport>
    where
        I: IntoIterator<Item = (PromptId, BulkEdit<'a>)>,
    {
        let mut report = BulkReport::default();
        let mut result = Ok(());

        for (id, edit) in edits {
            let existing = match self.store.get_by_id(id, Some(tenant_id)).await {
                Ok(Some(existing)) => existing,
                Ok(None) => {
                    report.skipped.push(id);
                    continue;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };

            let changeset = edit.changeset_for(&existing);
            match self.ledger.apply_mutation(&existing, &changeset).await {
                Ok(outcome) if outcome.changed => {
                    self.invalidate(&prompt_tag(id)).await;
                    if outcome.version_bumped {
                        report.version_bumps += 1;
                    }
                    report.updated.push(outcome.prompt);
                }
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        // Rows already written must not stay behind a cached list.
        if !report.updated.is_empty() {
            self.invalidate(&tenant_list_tag(tenant_id)).await;
        }
        result?;

        debug!(
            tenant_id = %tenant_id,
            updated = report.updated.len(),
            version_bumps = report.version_bumps,
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            "Bulk mutation applied"
        );
        Ok(report)
    }

    // ========================================================================
    // VERSIONS AND USAGE
    // ========================================================================

    /// Current prompt plus its ledger, newest first.
    ///
    /// `limit` defaults to the configured version list limit.
    pub async fn list_prompt_versions(
        &self,
        id: PromptId,
        tenant_id: &TenantId,
        limit: Option<usize>,
    ) -> VaultResult<Option<(Prompt, Vec<VersionEntry>)>> {
        let limit = limit.unwrap_or(self.config.version_list_limit);
        self.ledger.list_versions(id, tenant_id, limit).await
    }

    /// Record one use of `prompt`. Not cached.
    pub async fn record_usage(
        &self,
        prompt: &Prompt,
        metadata: Option<serde_json::Value>,
    ) -> VaultResult<DateTime<Utc>> {
        let event = UsageEvent {
            id: UsageEventId::new(self.ids.next_uuid()),
            prompt_id: prompt.id,
            tenant_id: prompt.tenant_id.clone(),
            metadata,
            used_at: self.clock.now(),
        };
        self.store.append_usage_event(&event).await?;
        Ok(event.used_at)
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Drop every cached list of a tenant.
    pub async fn invalidate_tenant_list_cache(&self, tenant_id: &TenantId) -> InvalidationReport {
        self.invalidate(&tenant_list_tag(tenant_id)).await
    }

    /// Drop every cached search-backed list of a tenant.
    pub async fn invalidate_tenant_search_cache(&self, tenant_id: &TenantId) -> InvalidationReport {
        self.invalidate(&tenant_search_tag(tenant_id)).await
    }

    async fn invalidate_prompt(&self, prompt: &Prompt) {
        self.invalidate(&prompt_tag(prompt.id)).await;
        self.invalidate(&tenant_list_tag(&prompt.tenant_id)).await;
    }

    async fn invalidate(&self, tag: &str) -> InvalidationReport {
        match self.cache.invalidate_tag(tag).await {
            Ok(report) => {
                CacheMetrics::add(&self.metrics.invalidated_entries, report.entries_removed);
                report
            }
            Err(e) => {
                CacheMetrics::incr(&self.metrics.degraded_cache_errors);
                warn!(tag = %tag, error = %e, "Tag invalidation failed; entries will expire on their own");
                InvalidationReport::default()
            }
        }
    }

    // ========================================================================
    // CACHE PLUMBING
    // ========================================================================

    async fn cache_lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        match self.cache.get::<T>(key).await {
            Ok(Some(read)) => {
                match read.freshness {
                    Freshness::Fresh => CacheMetrics::incr(&self.metrics.fresh_hits),
                    Freshness::Stale => CacheMetrics::incr(&self.metrics.stale_hits),
                }
                Some(read)
            }
            Ok(None) => {
                CacheMetrics::incr(&self.metrics.misses);
                None
            }
            Err(e) => {
                CacheMetrics::incr(&self.metrics.misses);
                self.record_cache_error("get", key, &e);
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(
        &self,
        key: &str,
        payload: &T,
        policy: CachePolicy,
        tags: &[String],
    ) {
        if let Err(e) = self.cache.put(key, payload, policy, tags).await {
            self.record_cache_error("put", key, &e);
        }
    }

    fn record_cache_error(&self, op: &'static str, key: &str, e: &promptvault_core::CacheError) {
        CacheMetrics::incr(&self.metrics.degraded_cache_errors);
        warn!(op, cache_key = %key, error = %e, "Cache operation failed; continuing without cache");
    }

    /// Run `rebuild` detached. Failures are logged and counted.
    fn spawn_rebuild<F>(&self, key: String, rebuild: F)
    where
        F: std::future::Future<Output = VaultResult<()>> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(cache_key = %key, "No runtime available; skipping background rebuild");
            return;
        };
        CacheMetrics::incr(&self.metrics.background_rebuilds);
        let metrics = self.metrics.clone();
        handle.spawn(async move {
            if let Err(e) = rebuild.await {
                CacheMetrics::incr(&metrics.rebuild_failures);
                error!(cache_key = %key, error = %e, "Background cache rebuild failed");
            }
        });
    }
}
