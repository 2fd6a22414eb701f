//! Version ledger manager.
//!
//! Owns the only transitions of a prompt's `version`: creation at version 1
//! and [`VersionLedger::apply_mutation`]. Every significant change appends
//! an immutable [`VersionEntry`] with the post-mutation values.
//!
//! The row write and the ledger append are two separate store calls. If the
//! append fails after the row was written, the row is kept and the failure
//! is logged: the ledger then has a gap for that version.

use std::sync::Arc;

use promptvault_core::{
    apply_changeset, normalize_metadata, normalize_tags, Clock, IdGenerator, LedgerError,
    MutationOutcome, NewPrompt, Prompt, PromptChangeset, PromptId, TenantId, ValidationError,
    VaultResult, VersionEntry, VersionEntryId,
};
use tracing::{debug, error};

use crate::store::PromptStore;

/// Applies mutations to prompts and keeps the version ledger in step.
#[derive(Clone)]
pub struct VersionLedger {
    store: Arc<dyn PromptStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for VersionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionLedger")
            .field("ids", &self.ids)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl VersionLedger {
    pub fn new(
        store: Arc<dyn PromptStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, ids, clock }
    }

    /// Insert a new prompt at version 1 and append its first ledger entry.
    pub async fn create(&self, input: NewPrompt) -> VaultResult<Prompt> {
        if input.title.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "title".to_string(),
            }
            .into());
        }

        let now = self.clock.now();
        let prompt = Prompt {
            id: PromptId::new(self.ids.next_uuid()),
            tenant_id: input.tenant_id,
            title: input.title,
            body: input.body,
            tags: normalize_tags(&input.tags),
            metadata: normalize_metadata(input.metadata.as_ref()),
            version: 1,
            archived: false,
            created_at: now,
            updated_at: now,
            created_by: input.created_by,
        };

        self.store.insert(&prompt).await?;
        self.append_entry(&prompt, prompt.created_by.clone()).await;
        Ok(prompt)
    }

    /// Apply `changeset` to `existing`, persist the result, and append a
    /// ledger entry when the change is significant.
    ///
    /// `existing` is the caller's snapshot: two concurrent calls against the
    /// same baseline both compute `baseline + 1`, and the later row write
    /// wins.
    pub async fn apply_mutation(
        &self,
        existing: &Prompt,
        changeset: &PromptChangeset,
    ) -> VaultResult<MutationOutcome> {
        changeset.validate()?;

        let outcome = apply_changeset(existing, changeset, self.clock.now())?;
        if !outcome.changed {
            debug!(prompt_id = %existing.id, "Changeset is a no-op");
            return Ok(outcome);
        }

        self.store.update(&outcome.prompt).await?;

        if outcome.version_bumped {
            let actor = changeset
                .updated_by
                .clone()
                .unwrap_or_else(|| existing.created_by.clone());
            self.append_entry(&outcome.prompt, actor).await;
        }
        Ok(outcome)
    }

    /// Current prompt plus up to `limit` ledger entries, newest first.
    ///
    /// Entries that share a version (left by concurrent writers on the same
    /// baseline) are all returned, newest append first.
    ///
    /// `Ok(None)` when the prompt does not exist for `tenant_id`.
    pub async fn list_versions(
        &self,
        id: PromptId,
        tenant_id: &TenantId,
        limit: usize,
    ) -> VaultResult<Option<(Prompt, Vec<VersionEntry>)>> {
        let Some(prompt) = self.store.get_by_id(id, Some(tenant_id)).await? else {
            return Ok(None);
        };
        let mut entries = self.store.list_version_entries(id, tenant_id, limit).await?;
        entries.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        entries.dedup_by_key(|e| e.id);
        entries.truncate(limit);
        Ok(Some((prompt, entries)))
    }

    async fn append_entry(&self, prompt: &Prompt, actor: String) {
        let entry = VersionEntry::snapshot(
            VersionEntryId::new(self.ids.next_uuid()),
            prompt,
            self.clock.now(),
            actor,
        );
        if let Err(e) = self.store.append_version_entry(&entry).await {
            let err = LedgerError::AppendFailed {
                prompt_id: prompt.id.to_string(),
                version: prompt.version,
                reason: e.to_string(),
            };
            error!(
                prompt_id = %prompt.id,
                tenant_id = %prompt.tenant_id,
                version = prompt.version,
                error = %err,
                "Version entry append failed; row mutation kept"
            );
        }
    }
}
