//! Source-of-truth store and search seams.
//!
//! The relational store and the full-text search engine are external
//! collaborators. The cache layer and the version ledger are written against
//! these traits only; [`crate::InMemoryPromptStore`] implements both.

use async_trait::async_trait;
use promptvault_core::{
    Prompt, PromptHit, PromptId, ScanRequest, SearchRequest, TenantId, UsageEvent, VaultResult,
    VersionEntry,
};

/// Rows of one scan page plus the total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub rows: Vec<Prompt>,
    pub total: u64,
}

/// Ranked hits of one search page plus the total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub hits: Vec<PromptHit>,
    pub total: u64,
}

/// Authoritative prompt store.
///
/// Implementations own every durable invariant: uniqueness of ids, cascade
/// removal of version entries, tenant scoping. Failures here are the only
/// errors callers of the service ever see.
#[async_trait]
pub trait PromptStore: Send + Sync {
    // ========================================================================
    // PROMPT OPERATIONS
    // ========================================================================

    /// Get a prompt by id, optionally requiring it to belong to `tenant_id`.
    async fn get_by_id(
        &self,
        id: PromptId,
        tenant_id: Option<&TenantId>,
    ) -> VaultResult<Option<Prompt>>;

    /// Filtered, sorted, paginated scan. Archived rows are never returned.
    async fn scan(&self, request: &ScanRequest) -> VaultResult<ScanResult>;

    /// Insert a new prompt.
    async fn insert(&self, prompt: &Prompt) -> VaultResult<()>;

    /// Replace an existing prompt row.
    async fn update(&self, prompt: &Prompt) -> VaultResult<()>;

    /// Delete a prompt and, by cascade, its version entries.
    async fn delete(&self, id: PromptId, tenant_id: &TenantId) -> VaultResult<()>;

    /// Every tenant that owns at least one prompt.
    async fn distinct_tenants(&self) -> VaultResult<Vec<TenantId>>;

    // ========================================================================
    // LEDGER OPERATIONS
    // ========================================================================

    /// Append an immutable version entry.
    async fn append_version_entry(&self, entry: &VersionEntry) -> VaultResult<()>;

    /// Version entries of a prompt, newest first, at most `limit`.
    async fn list_version_entries(
        &self,
        prompt_id: PromptId,
        tenant_id: &TenantId,
        limit: usize,
    ) -> VaultResult<Vec<VersionEntry>>;

    // ========================================================================
    // USAGE OPERATIONS
    // ========================================================================

    /// Record a usage event.
    async fn append_usage_event(&self, event: &UsageEvent) -> VaultResult<()>;
}

/// Full-text search collaborator.
#[async_trait]
pub trait PromptSearch: Send + Sync {
    /// Ranked, highlighted hits for `request`, plus the total match count.
    async fn search(&self, request: &SearchRequest) -> VaultResult<SearchResult>;
}
