//! Cache key and cache tag naming.
//!
//! Tags decide invalidation scope: every list entry carries the global
//! `list` tag and its tenant's `list:tenant:{id}` tag, so a mutation only has
//! to purge one tag instead of tracking every query key it may affect.

use crate::{ListQuery, Prompt, PromptId, TenantId};

/// Tag attached to every list entry.
pub const LIST_TAG: &str = "list";

/// Shared key recording the last cache-warm run.
pub const WARM_GATE_KEY: &str = "warm:last_run";

/// Cache key of a single prompt.
pub fn prompt_cache_key(id: PromptId) -> String {
    format!("prompt:{id}")
}

/// Tag covering the single-prompt entry of `id`.
pub fn prompt_tag(id: PromptId) -> String {
    format!("prompt:{id}")
}

/// Tag covering every cache entry owned by a tenant.
pub fn tenant_tag(tenant_id: &TenantId) -> String {
    format!("tenant:{tenant_id}")
}

/// Tag covering every list entry of a tenant.
pub fn tenant_list_tag(tenant_id: &TenantId) -> String {
    format!("list:tenant:{tenant_id}")
}

/// Tag covering the search-backed list entries of a tenant.
pub fn tenant_search_tag(tenant_id: &TenantId) -> String {
    format!("search:tenant:{tenant_id}")
}

/// Tags for a list entry.
pub fn list_tags(query: &ListQuery) -> Vec<String> {
    let mut tags = vec![LIST_TAG.to_string(), tenant_list_tag(&query.tenant_id)];
    if query.search.is_some() {
        tags.push(tenant_search_tag(&query.tenant_id));
    }
    tags
}

/// Tags for a single-prompt entry.
pub fn prompt_tags(prompt: &Prompt) -> Vec<String> {
    vec![prompt_tag(prompt.id), tenant_tag(&prompt.tenant_id)]
}
