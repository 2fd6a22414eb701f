//! List queries, their deterministic cache keys, and paginated results.

use crate::{Prompt, ScanFilter, ScanRequest, SearchRequest, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Prefix of every list cache key.
pub const LIST_KEY_PREFIX: &str = "list:";

/// Field a list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    UpdatedAt,
    CreatedAt,
    Title,
    Version,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdatedAt => "updated_at",
            Self::CreatedAt => "created_at",
            Self::Title => "title",
            Self::Version => "version",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Parameters of a list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub tenant_id: TenantId,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub metadata_key: Option<String>,
    pub metadata_value: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl ListQuery {
    /// Most recently updated first, first page, default page size.
    pub fn new(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            search: None,
            tag: None,
            metadata_key: None,
            metadata_value: None,
            sort: SortField::default(),
            order: SortOrder::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.metadata_key = Some(key.into());
        self.metadata_value = value;
        self
    }

    pub fn sorted_by(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Canonical form: blank strings dropped, page clamped to at least 1,
    /// page size clamped into `1..=max_page_size`.
    pub fn normalized(mut self, max_page_size: u32) -> Self {
        self.search = non_blank(self.search);
        self.tag = non_blank(self.tag);
        self.metadata_key = non_blank(self.metadata_key);
        self.metadata_value = non_blank(self.metadata_value);
        self.page = self.page.max(1);
        self.page_size = self.page_size.clamp(1, max_page_size.max(1));
        self
    }

    /// Named query dimensions; absent optional parameters are omitted.
    pub fn dimensions(&self) -> Vec<(&'static str, String)> {
        let mut dims = vec![
            ("tenant_id", self.tenant_id.to_string()),
            ("sort", self.sort.as_str().to_string()),
            ("order", self.order.as_str().to_string()),
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        let optional = [
            ("search", &self.search),
            ("tag", &self.tag),
            ("metadata_key", &self.metadata_key),
            ("metadata_value", &self.metadata_value),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                dims.push((name, value.clone()));
            }
        }
        dims
    }

    pub fn cache_key(&self) -> ListQueryKey {
        ListQueryKey::from_dimensions(self.dimensions())
    }

    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    pub fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            filter: ScanFilter {
                tenant_id: self.tenant_id.clone(),
                tag: self.tag.clone(),
                metadata_key: self.metadata_key.clone(),
                metadata_value: self.metadata_value.clone(),
            },
            sort: self.sort,
            order: self.order,
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Search request for this query, if it carries a search term.
    pub fn search_request(&self) -> Option<SearchRequest> {
        self.search.as_ref().map(|query| SearchRequest {
            tenant_id: self.tenant_id.clone(),
            query: query.clone(),
            tag: self.tag.clone(),
            metadata_key: self.metadata_key.clone(),
            metadata_value: self.metadata_value.clone(),
            limit: self.page_size,
            offset: self.offset(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Deterministic cache key of a list query.
///
/// Dimensions are sorted by name before concatenation, so the same logical
/// query always maps to the same key regardless of parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListQueryKey(String);

impl ListQueryKey {
    pub fn from_dimensions<I, K, V>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut dims: Vec<(String, String)> = dimensions
            .into_iter()
            .map(|(k, v)| (escape(k.as_ref()), escape(v.as_ref())))
            .collect();
        dims.sort();

        let body = dims
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        Self(format!("{LIST_KEY_PREFIX}{body}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListQueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Percent-escape the characters that delimit key components.
fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

/// A page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PaginatedResult<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }
}

/// A list row: the prompt, plus ranking data when it came from search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptHit {
    pub prompt: Prompt,
    #[serde(default)]
    pub highlights: Vec<String>,
    pub score: Option<f64>,
}

impl PromptHit {
    /// A row from a direct scan (no ranking).
    pub fn plain(prompt: Prompt) -> Self {
        Self {
            prompt,
            highlights: Vec::new(),
            score: None,
        }
    }
}

/// Result of `list_prompts`.
pub type ListPage = PaginatedResult<PromptHit>;
