//! Core entity structures

use crate::{PromptId, TenantId, Timestamp, UsageEventId, VersionEntryId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A tenant-scoped prompt record.
///
/// Owned exclusively by the source-of-truth store; cache entries hold
/// disposable copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub tenant_id: TenantId,
    pub title: String,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub metadata: Option<serde_json::Value>,
    /// Starts at 1 and increases by exactly one per significant mutation.
    pub version: u32,
    pub archived: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub created_by: String,
}

/// Input for creating a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrompt {
    pub tenant_id: TenantId,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_by: String,
}

impl NewPrompt {
    pub fn new(
        tenant_id: impl Into<TenantId>,
        title: impl Into<String>,
        body: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            metadata: None,
            created_by: created_by.into(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Immutable snapshot of a prompt at a given version.
///
/// Append-only; removed only by cascade when the parent prompt is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: VersionEntryId,
    pub prompt_id: PromptId,
    pub tenant_id: TenantId,
    pub version: u32,
    pub title: String,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub created_by: String,
}

impl VersionEntry {
    /// Capture the current (post-mutation) state of a prompt.
    pub fn snapshot(
        id: VersionEntryId,
        prompt: &Prompt,
        created_at: Timestamp,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id,
            prompt_id: prompt.id,
            tenant_id: prompt.tenant_id.clone(),
            version: prompt.version,
            title: prompt.title.clone(),
            body: prompt.body.clone(),
            tags: prompt.tags.clone(),
            metadata: prompt.metadata.clone(),
            created_at,
            created_by: created_by.into(),
        }
    }
}

/// A single recorded use of a prompt. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: UsageEventId,
    pub prompt_id: PromptId,
    pub tenant_id: TenantId,
    pub metadata: Option<serde_json::Value>,
    pub used_at: Timestamp,
}
