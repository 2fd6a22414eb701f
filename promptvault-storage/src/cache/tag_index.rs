//! Tag index: reverse pointers from a tag to the cache keys it covers.
//!
//! Pointers live in the same key-value backend as the entries, under
//! `tag:{tag}:{cache_key}`, and expire together with the entry they point
//! at. Because a tag may itself contain `:`, the prefix `tag:{tag}:` can
//! also match pointers of a longer tag (`list` vs `list:tenant:t1`); the
//! pointer value records its exact tag so invalidation only removes its own.

use std::time::Duration;

use promptvault_core::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::KvBackend;

/// Default number of pointers fetched per scan page.
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 100;

/// Stored value of a tag pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPointer {
    pub tag: String,
    pub cache_key: String,
}

impl TagPointer {
    pub fn new(tag: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            cache_key: cache_key.into(),
        }
    }

    /// Backend key of this pointer.
    pub fn key(&self) -> String {
        pointer_key(&self.tag, &self.cache_key)
    }
}

/// Backend key of the pointer from `tag` to `cache_key`.
pub fn pointer_key(tag: &str, cache_key: &str) -> String {
    format!("{}{cache_key}", tag_prefix(tag))
}

/// Scan prefix covering every pointer of `tag`.
pub fn tag_prefix(tag: &str) -> String {
    format!("tag:{tag}:")
}

/// Counts from one `invalidate_tag` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub pointers_removed: u64,
    pub entries_removed: u64,
}

/// Write one pointer per tag for `cache_key`, each living for `ttl`.
pub async fn register(
    backend: &dyn KvBackend,
    cache_key: &str,
    tags: &[String],
    ttl: Duration,
) -> CacheResult<()> {
    for tag in tags {
        let pointer = TagPointer::new(tag.as_str(), cache_key);
        let value =
            serde_json::to_vec(&pointer).map_err(|e| CacheError::Serialization(e.to_string()))?;
        backend.set(&pointer.key(), value, ttl).await?;
    }
    Ok(())
}

/// Remove every entry tagged `tag`, and the pointers that reference them.
///
/// Walks the pointer prefix with a cursor until the backend reports the scan
/// is exhausted. Entries written after a page was read may survive.
pub async fn invalidate_tag(
    backend: &dyn KvBackend,
    tag: &str,
    page_size: usize,
) -> CacheResult<InvalidationReport> {
    let prefix = tag_prefix(tag);
    let page_size = page_size.max(1);
    let mut report = InvalidationReport::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = backend
            .scan_prefix(&prefix, cursor.as_deref(), page_size)
            .await?;

        for key in &page.keys {
            let Some(raw) = backend.get(key).await? else {
                continue;
            };
            match serde_json::from_slice::<TagPointer>(&raw) {
                Ok(pointer) if pointer.tag == tag => {
                    if backend.delete(&pointer.cache_key).await? {
                        report.entries_removed += 1;
                    }
                    if backend.delete(key).await? {
                        report.pointers_removed += 1;
                    }
                }
                // Pointer of a longer tag sharing this prefix.
                Ok(_) => {}
                Err(e) => {
                    debug!(key = %key, error = %e, "Dropping unreadable tag pointer");
                    if backend.delete(key).await? {
                        report.pointers_removed += 1;
                    }
                }
            }
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(
        tag = %tag,
        pointers_removed = report.pointers_removed,
        entries_removed = report.entries_removed,
        "Tag invalidated"
    );
    Ok(report)
}
