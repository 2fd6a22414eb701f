//! Filter predicates for direct store scans and search requests.
//!
//! Tag and metadata filters match by substring over the serialized JSON of
//! the field, not by structured equality: a tag filter `eng` also matches a
//! prompt tagged `engineering`. Store implementations must reproduce this
//! behaviour so that cached and uncached results agree.

use crate::{Prompt, SortField, SortOrder, TenantId};
use serde::{Deserialize, Serialize};

/// Filters applied by a direct scan. `archived = false` is always implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFilter {
    pub tenant_id: TenantId,
    pub tag: Option<String>,
    pub metadata_key: Option<String>,
    pub metadata_value: Option<String>,
}

impl ScanFilter {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            tag: None,
            metadata_key: None,
            metadata_value: None,
        }
    }

    /// Evaluate the filter against a prompt row.
    pub fn matches(&self, prompt: &Prompt) -> bool {
        if prompt.tenant_id != self.tenant_id || prompt.archived {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !tags_match(prompt, tag) {
                return false;
            }
        }
        metadata_matches(
            prompt,
            self.metadata_key.as_deref(),
            self.metadata_value.as_deref(),
        )
    }
}

/// Substring match of `tag` over the serialized tag list.
pub fn tags_match(prompt: &Prompt, tag: &str) -> bool {
    serde_json::to_string(&prompt.tags)
        .map(|serialized| serialized.contains(tag))
        .unwrap_or(false)
}

/// Substring match of key and value over the serialized metadata.
///
/// A value without a key is ignored. Prompts without metadata never match a
/// metadata filter.
pub fn metadata_matches(prompt: &Prompt, key: Option<&str>, value: Option<&str>) -> bool {
    let Some(key) = key else {
        return true;
    };
    let Some(metadata) = &prompt.metadata else {
        return false;
    };
    let Ok(serialized) = serde_json::to_string(metadata) else {
        return false;
    };
    if !serialized.contains(key) {
        return false;
    }
    value.map(|v| serialized.contains(v)).unwrap_or(true)
}

/// A paginated direct scan against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub filter: ScanFilter,
    pub sort: SortField,
    pub order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl ScanRequest {
    /// Number of rows to skip.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }
}

/// A request to the full-text search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub tenant_id: TenantId,
    pub query: String,
    pub tag: Option<String>,
    pub metadata_key: Option<String>,
    pub metadata_value: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl SearchRequest {
    /// The non-text part of the request as a scan filter.
    pub fn filter(&self) -> ScanFilter {
        ScanFilter {
            tenant_id: self.tenant_id.clone(),
            tag: self.tag.clone(),
            metadata_key: self.metadata_key.clone(),
            metadata_value: self.metadata_value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{normalize_tags, PromptId};
    use chrono::Utc;
    use serde_json::json;

    fn make_prompt(tags: &[&str], metadata: Option<serde_json::Value>) -> Prompt {
        let now = Utc::now();
        Prompt {
            id: PromptId::now_v7(),
            tenant_id: TenantId::from("t1"),
            title: "title".to_string(),
            body: "body".to_string(),
            tags: normalize_tags(tags.iter().copied()),
            metadata,
            version: 1,
            archived: false,
            created_at: now,
            updated_at: now,
            created_by: "alice".to_string(),
        }
    }

    #[test]
    fn test_tag_substring_matches_longer_tag() {
        let prompt = make_prompt(&["engineering"], None);
        assert!(tags_match(&prompt, "eng"));
        assert!(tags_match(&prompt, "engineering"));
        assert!(!tags_match(&prompt, "sales"));
    }

    #[test]
    fn test_metadata_key_and_value() {
        let prompt = make_prompt(&[], Some(json!({"team": "platform"})));
        assert!(metadata_matches(&prompt, Some("team"), Some("platform")));
        assert!(metadata_matches(&prompt, Some("team"), None));
        assert!(!metadata_matches(&prompt, Some("team"), Some("growth")));
        assert!(!metadata_matches(&prompt, Some("owner"), None));
        assert!(metadata_matches(&prompt, None, Some("ignored")));
    }

    #[test]
    fn test_metadata_filter_requires_metadata() {
        let prompt = make_prompt(&[], None);
        assert!(!metadata_matches(&prompt, Some("team"), None));
    }

    #[test]
    fn test_archived_never_matches() {
        let mut prompt = make_prompt(&["x"], Some(json!({"k": "v"})));
        prompt.archived = true;
        let filter = ScanFilter {
            tenant_id: TenantId::from("t1"),
            tag: Some("x".to_string()),
            metadata_key: Some("k".to_string()),
            metadata_value: Some("v".to_string()),
        };
        assert!(!filter.matches(&prompt));
        prompt.archived = false;
        assert!(filter.matches(&prompt));
    }

    #[test]
    fn test_other_tenant_never_matches() {
        let prompt = make_prompt(&[], None);
        let filter = ScanFilter::for_tenant(TenantId::from("t2"));
        assert!(!filter.matches(&prompt));
    }

    #[test]
    fn test_scan_offset() {
        let request = ScanRequest {
            filter: ScanFilter::for_tenant(TenantId::from("t1")),
            sort: SortField::UpdatedAt,
            order: SortOrder::Desc,
            page: 3,
            page_size: 20,
        };
        assert_eq!(request.offset(), 40);
    }
}
