//! Mutation changesets and the version-significance rule.
//!
//! Every mutation path (single update, bulk update, bulk tag edit) funnels
//! through [`apply_changeset`], so the versioning invariant lives in exactly
//! one place:
//!
//! - a change to `title`, `body`, `tags` (as a normalized set) or `metadata`
//!   (as a normalized structure) bumps `version` by exactly one;
//! - toggling `archived` alone never changes `version`.

use crate::{Prompt, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Requested changes to a prompt. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptChangeset {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    /// `Some(None)` clears metadata.
    pub metadata: Option<Option<serde_json::Value>>,
    pub archived: Option<bool>,
    /// Actor recorded on the ledger entry; falls back to the prompt's creator.
    pub updated_by: Option<String>,
}

impl PromptChangeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn metadata(mut self, metadata: Option<serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    pub fn updated_by(mut self, actor: impl Into<String>) -> Self {
        self.updated_by = Some(actor.into());
        self
    }

    /// Reject changesets that would produce an invalid prompt.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "title".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Result of applying a changeset to an existing prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub prompt: Prompt,
    pub version_bumped: bool,
    /// False when the changeset matched the existing row exactly.
    pub changed: bool,
}

/// Trim tags, drop empties and deduplicate.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// JSON `null` and an absent value are the same metadata.
pub fn normalize_metadata(metadata: Option<&serde_json::Value>) -> Option<serde_json::Value> {
    match metadata {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(value.clone()),
    }
}

/// Compute the post-mutation prompt.
///
/// Pure: the caller persists the result and appends the ledger entry.
///
/// Fails when a significant change would push `version` past `u32::MAX`.
pub fn apply_changeset(
    existing: &Prompt,
    changeset: &PromptChangeset,
    now: Timestamp,
) -> Result<MutationOutcome, ValidationError> {
    let mut next = existing.clone();
    let mut significant = false;

    if let Some(title) = &changeset.title {
        if *title != existing.title {
            next.title = title.clone();
            significant = true;
        }
    }

    if let Some(body) = &changeset.body {
        if *body != existing.body {
            next.body = body.clone();
            significant = true;
        }
    }

    if let Some(tags) = &changeset.tags {
        let tags = normalize_tags(tags);
        if tags != normalize_tags(&existing.tags) {
            next.tags = tags;
            significant = true;
        }
    }

    if let Some(metadata) = &changeset.metadata {
        let metadata = normalize_metadata(metadata.as_ref());
        if metadata != normalize_metadata(existing.metadata.as_ref()) {
            next.metadata = metadata;
            significant = true;
        }
    }

    let mut archived_changed = false;
    if let Some(archived) = changeset.archived {
        if archived != existing.archived {
            next.archived = archived;
            archived_changed = true;
        }
    }

    if significant {
        next.version =
            existing
                .version
                .checked_add(1)
                .ok_or_else(|| ValidationError::InvalidValue {
                    field: "version".to_string(),
                    reason: format!("version {} cannot be incremented", existing.version),
                })?;
    }
    let changed = significant || archived_changed;
    if changed {
        next.updated_at = now;
    }

    Ok(MutationOutcome {
        prompt: next,
        version_bumped: significant,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PromptId, TenantId};
    use chrono::Utc;
    use serde_json::json;

    fn make_prompt() -> Prompt {
        let now = Utc::now();
        Prompt {
            id: PromptId::now_v7(),
            tenant_id: TenantId::from("t1"),
            title: "A".to_string(),
            body: "B".to_string(),
            tags: normalize_tags(["x", "y"]),
            metadata: Some(json!({"team": "eng", "priority": 1})),
            version: 1,
            archived: false,
            created_at: now,
            updated_at: now,
            created_by: "alice".to_string(),
        }
    }

    #[test]
    fn test_archive_only_does_not_bump() {
        let prompt = make_prompt();
        let outcome = apply_changeset(&prompt, &PromptChangeset::new().archived(true), Utc::now())
            .expect("apply");
        assert!(outcome.changed);
        assert!(!outcome.version_bumped);
        assert_eq!(outcome.prompt.version, 1);
        assert!(outcome.prompt.archived);
    }

    #[test]
    fn test_title_change_bumps_once() {
        let prompt = make_prompt();
        let outcome = apply_changeset(
            &prompt,
            &PromptChangeset::new().title("A2").body("B2"),
            Utc::now(),
        )
        .expect("apply");
        assert!(outcome.version_bumped);
        assert_eq!(outcome.prompt.version, 2);
        assert_eq!(outcome.prompt.title, "A2");
        assert_eq!(outcome.prompt.body, "B2");
    }

    #[test]
    fn test_same_values_are_not_significant() {
        let prompt = make_prompt();
        let outcome = apply_changeset(
            &prompt,
            &PromptChangeset::new()
                .title("A")
                .tags(["y", " x ", "x"])
                .metadata(Some(json!({"priority": 1, "team": "eng"}))),
            Utc::now(),
        )
        .expect("apply");
        assert!(!outcome.version_bumped);
        assert!(!outcome.changed);
        assert_eq!(outcome.prompt, prompt);
    }

    #[test]
    fn test_metadata_null_equals_absent() {
        let mut prompt = make_prompt();
        prompt.metadata = None;
        let outcome = apply_changeset(
            &prompt,
            &PromptChangeset::new().metadata(Some(serde_json::Value::Null)),
            Utc::now(),
        )
        .expect("apply");
        assert!(!outcome.version_bumped);
    }

    #[test]
    fn test_clearing_metadata_bumps() {
        let prompt = make_prompt();
        let outcome = apply_changeset(&prompt, &PromptChangeset::new().metadata(None), Utc::now())
            .expect("apply");
        assert!(outcome.version_bumped);
        assert_eq!(outcome.prompt.metadata, None);
    }

    #[test]
    fn test_archive_and_body_change_bumps() {
        let prompt = make_prompt();
        let outcome = apply_changeset(
            &prompt,
            &PromptChangeset::new().archived(true).body("new body"),
            Utc::now(),
        )
        .expect("apply");
        assert!(outcome.version_bumped);
        assert!(outcome.prompt.archived);
        assert_eq!(outcome.prompt.version, 2);
    }

    #[test]
    fn test_version_overflow_is_rejected() {
        let mut prompt = make_prompt();
        prompt.version = u32::MAX;
        let err = apply_changeset(&prompt, &PromptChangeset::new().body("B2"), Utc::now())
            .expect_err("version cannot overflow");
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "version"));

        // Archive toggles never touch the version, so they still apply.
        let outcome = apply_changeset(&prompt, &PromptChangeset::new().archived(true), Utc::now())
            .expect("apply");
        assert_eq!(outcome.prompt.version, u32::MAX);
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        assert!(PromptChangeset::new().title("   ").validate().is_err());
        assert!(PromptChangeset::new().title("ok").validate().is_ok());
        assert!(PromptChangeset::new().validate().is_ok());
    }
}
