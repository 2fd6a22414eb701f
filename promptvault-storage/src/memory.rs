//! In-memory prompt store and search engine.
//!
//! Used by tests and local development. Mirrors the relational store's
//! observable behaviour: substring tag and metadata filters, archived rows
//! excluded from scans, version entries removed with their prompt.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use promptvault_core::{
    EntityKind, Prompt, PromptHit, PromptId, ScanRequest, SearchRequest, SortField, SortOrder,
    StorageError, TenantId, UsageEvent, VaultResult, VersionEntry,
};

use crate::store::{PromptSearch, PromptStore, ScanResult, SearchResult};

/// Characters of context kept on each side of a highlighted match.
const HIGHLIGHT_CONTEXT: usize = 24;

/// Maximum highlight fragments per hit.
const MAX_HIGHLIGHTS: usize = 3;

/// In-memory store implementing both [`PromptStore`] and [`PromptSearch`].
#[derive(Debug, Default)]
pub struct InMemoryPromptStore {
    prompts: Arc<RwLock<HashMap<PromptId, Prompt>>>,
    versions: Arc<RwLock<HashMap<PromptId, Vec<VersionEntry>>>>,
    usage: Arc<RwLock<Vec<UsageEvent>>>,
    fail_version_appends: AtomicBool,
    unavailable: AtomicBool,
}

impl InMemoryPromptStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every version-entry append fail.
    pub fn set_fail_version_appends(&self, fail: bool) {
        self.fail_version_appends.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored prompts, archived included.
    pub fn prompt_count(&self) -> VaultResult<usize> {
        Ok(self
            .prompts
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .len())
    }

    /// Number of recorded usage events.
    pub fn usage_event_count(&self) -> VaultResult<usize> {
        Ok(self
            .usage
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .len())
    }

    fn check_available(&self) -> VaultResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "in-memory store marked unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn filtered_sorted(&self, request: &ScanRequest) -> VaultResult<Vec<Prompt>> {
        let prompts = self.prompts.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut rows: Vec<Prompt> = prompts
            .values()
            .filter(|p| request.filter.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare(a, b, request.sort, request.order));
        Ok(rows)
    }
}

fn compare(a: &Prompt, b: &Prompt, sort: SortField, order: SortOrder) -> CmpOrdering {
    let ord = match sort {
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Title => a.title.cmp(&b.title),
        SortField::Version => a.version.cmp(&b.version),
    };
    let ord = ord.then_with(|| a.id.cmp(&b.id));
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

/// Count case-insensitive occurrences of `needle` and collect highlight
/// fragments with the match wrapped in `<mark>`.
fn score_text(text: &str, needle: &str, highlights: &mut Vec<String>) -> usize {
    if needle.is_empty() {
        return 0;
    }

    // Lowercasing can change byte lengths, so every haystack byte keeps the
    // span of the source character it came from.
    let mut haystack = String::with_capacity(text.len());
    let mut spans: Vec<(usize, usize)> = Vec::with_capacity(text.len());
    for (idx, ch) in text.char_indices() {
        let span = (idx, idx + ch.len_utf8());
        for lower in ch.to_lowercase() {
            haystack.push(lower);
            spans.extend(std::iter::repeat(span).take(lower.len_utf8()));
        }
    }

    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        count += 1;

        if highlights.len() < MAX_HIGHLIGHTS {
            let (match_lo, _) = spans[start];
            let (_, match_hi) = spans[end - 1];
            // A match covering part of one character's lowercase form has no
            // exact source slice to mark.
            if text[match_lo..match_hi].to_lowercase() == needle {
                let lo = floor_boundary(text, match_lo.saturating_sub(HIGHLIGHT_CONTEXT));
                let hi = ceil_boundary(text, (match_hi + HIGHLIGHT_CONTEXT).min(text.len()));
                highlights.push(format!(
                    "{}<mark>{}</mark>{}",
                    &text[lo..match_lo],
                    &text[match_lo..match_hi],
                    &text[match_hi..hi]
                ));
            }
        }
        from = end;
    }
    count
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[async_trait]
impl PromptStore for InMemoryPromptStore {
    async fn get_by_id(
        &self,
        id: PromptId,
        tenant_id: Option<&TenantId>,
    ) -> VaultResult<Option<Prompt>> {
        self.check_available()?;
        let prompts = self.prompts.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(prompts
            .get(&id)
            .filter(|p| tenant_id.map(|t| &p.tenant_id == t).unwrap_or(true))
            .cloned())
    }

    async fn scan(&self, request: &ScanRequest) -> VaultResult<ScanResult> {
        self.check_available()?;
        let rows = self.filtered_sorted(request)?;
        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(request.offset())
            .take(request.page_size as usize)
            .collect();
        Ok(ScanResult { rows, total })
    }

    async fn insert(&self, prompt: &Prompt) -> VaultResult<()> {
        self.check_available()?;
        let mut prompts = self.prompts.write().map_err(|_| StorageError::LockPoisoned)?;
        if prompts.contains_key(&prompt.id) {
            return Err(StorageError::Duplicate {
                entity: EntityKind::Prompt,
                id: prompt.id.to_string(),
            }
            .into());
        }
        prompts.insert(prompt.id, prompt.clone());
        Ok(())
    }

    async fn update(&self, prompt: &Prompt) -> VaultResult<()> {
        self.check_available()?;
        let mut prompts = self.prompts.write().map_err(|_| StorageError::LockPoisoned)?;
        match prompts.get_mut(&prompt.id) {
            Some(existing) if existing.tenant_id == prompt.tenant_id => {
                *existing = prompt.clone();
                Ok(())
            }
            _ => Err(StorageError::NotFound {
                entity: EntityKind::Prompt,
                id: prompt.id.to_string(),
            }
            .into()),
        }
    }

    async fn delete(&self, id: PromptId, tenant_id: &TenantId) -> VaultResult<()> {
        self.check_available()?;
        {
            let mut prompts = self.prompts.write().map_err(|_| StorageError::LockPoisoned)?;
            match prompts.get(&id) {
                Some(p) if &p.tenant_id == tenant_id => {
                    prompts.remove(&id);
                }
                _ => {
                    return Err(StorageError::NotFound {
                        entity: EntityKind::Prompt,
                        id: id.to_string(),
                    }
                    .into())
                }
            }
        }
        self.versions
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .remove(&id);
        Ok(())
    }

    async fn distinct_tenants(&self) -> VaultResult<Vec<TenantId>> {
        self.check_available()?;
        let prompts = self.prompts.read().map_err(|_| StorageError::LockPoisoned)?;
        let tenants: BTreeSet<TenantId> = prompts.values().map(|p| p.tenant_id.clone()).collect();
        Ok(tenants.into_iter().collect())
    }

    async fn append_version_entry(&self, entry: &VersionEntry) -> VaultResult<()> {
        self.check_available()?;
        if self.fail_version_appends.load(Ordering::SeqCst) {
            return Err(StorageError::InsertFailed {
                entity: EntityKind::VersionEntry,
                reason: "version append failure injected".to_string(),
            }
            .into());
        }
        let mut versions = self.versions.write().map_err(|_| StorageError::LockPoisoned)?;
        let entries = versions.entry(entry.prompt_id).or_default();
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(StorageError::Duplicate {
                entity: EntityKind::VersionEntry,
                id: entry.id.to_string(),
            }
            .into());
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn list_version_entries(
        &self,
        prompt_id: PromptId,
        tenant_id: &TenantId,
        limit: usize,
    ) -> VaultResult<Vec<VersionEntry>> {
        self.check_available()?;
        let versions = self.versions.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut entries: Vec<VersionEntry> = versions
            .get(&prompt_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| &e.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    async fn append_usage_event(&self, event: &UsageEvent) -> VaultResult<()> {
        self.check_available()?;
        self.usage
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl PromptSearch for InMemoryPromptStore {
    async fn search(&self, request: &SearchRequest) -> VaultResult<SearchResult> {
        self.check_available()?;
        let needle = request.query.trim().to_lowercase();
        let filter = request.filter();
        let prompts = self.prompts.read().map_err(|_| StorageError::LockPoisoned)?;

        let mut hits: Vec<PromptHit> = prompts
            .values()
            .filter(|p| filter.matches(p))
            .filter_map(|p| {
                if needle.is_empty() {
                    return None;
                }
                let mut highlights = Vec::new();
                let score = score_text(&p.title, &needle, &mut highlights)
                    + score_text(&p.body, &needle, &mut highlights);
                (score > 0).then(|| PromptHit {
                    prompt: p.clone(),
                    highlights,
                    score: Some(score as f64),
                })
            })
            .collect();
        drop(prompts);

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| b.prompt.updated_at.cmp(&a.prompt.updated_at))
                .then_with(|| a.prompt.id.cmp(&b.prompt.id))
        });

        let total = hits.len() as u64;
        let hits = hits
            .into_iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .collect();
        Ok(SearchResult { hits, total })
    }
}
