//! Typed envelope store over a [`KvBackend`].
//!
//! `put` writes the tag pointers first and the entry second, so an entry is
//! never visible without the pointers that let invalidation find it. A crash
//! between the two leaves only orphan pointers, which expire on their own.

use std::sync::Arc;

use promptvault_core::{CacheError, CacheResult, Clock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use super::backend::KvBackend;
use super::envelope::{CacheEnvelope, CachePolicy, CacheRead};
use super::tag_index::{self, InvalidationReport, DEFAULT_SCAN_PAGE_SIZE};

/// Envelope-aware cache over a raw key-value backend.
#[derive(Clone)]
pub struct EnvelopeStore {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    scan_page_size: usize,
}

impl std::fmt::Debug for EnvelopeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeStore")
            .field("scan_page_size", &self.scan_page_size)
            .finish_non_exhaustive()
    }
}

impl EnvelopeStore {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    /// Set how many pointers each invalidation scan page fetches.
    pub fn with_scan_page_size(mut self, scan_page_size: usize) -> Self {
        self.scan_page_size = scan_page_size.max(1);
        self
    }

    /// The underlying backend, for raw keys that are not envelopes.
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Write `payload` under `key` with the given windows and tags.
    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        payload: &T,
        policy: CachePolicy,
        tags: &[String],
    ) -> CacheResult<()> {
        let envelope = CacheEnvelope::new(payload, self.clock.now(), policy, tags.to_vec());
        let bytes =
            serde_json::to_vec(&envelope).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let ttl = policy.total();

        tag_index::register(self.backend.as_ref(), key, tags, ttl).await?;
        self.backend.set(key, bytes, ttl).await?;

        trace!(key = %key, tags = ?tags, ttl_ms = ttl.as_millis() as u64, "Cache entry written");
        Ok(())
    }

    /// Read `key`, classifying it as fresh or stale. Absent past `stale_at`.
    ///
    /// An entry that no longer decodes as `T` is deleted and reported absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<CacheRead<T>>> {
        let Some(bytes) = self.backend.get(key).await? else {
            return Ok(None);
        };

        let envelope: CacheEnvelope<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(key = %key, error = %e, "Dropping undecodable cache entry");
                self.backend.delete(key).await?;
                return Ok(None);
            }
        };

        Ok(envelope
            .freshness_at(self.clock.now())
            .map(|freshness| CacheRead {
                payload: envelope.payload,
                freshness,
                cached_at: envelope.cached_at,
            }))
    }

    /// Remove the entry only. Its pointers are left to expire or be
    /// cleaned by invalidation.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.backend.delete(key).await
    }

    /// Remove every entry tagged `tag`.
    pub async fn invalidate_tag(&self, tag: &str) -> CacheResult<InvalidationReport> {
        tag_index::invalidate_tag(self.backend.as_ref(), tag, self.scan_page_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Freshness, InMemoryKvBackend, tag_index::pointer_key};
    use promptvault_core::ManualClock;
    use std::time::Duration;

    fn store() -> (EnvelopeStore, Arc<InMemoryKvBackend>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let kv = Arc::new(InMemoryKvBackend::new(clock.clone()));
        (
            EnvelopeStore::new(kv.clone(), clock.clone()).with_scan_page_size(2),
            kv,
            clock,
        )
    }

    fn policy() -> CachePolicy {
        CachePolicy::new(Duration::from_secs(60), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_fresh_then_stale_then_absent() {
        let (store, _kv, clock) = store();
        store
            .put("k", &"payload".to_string(), policy(), &[])
            .await
            .expect("put");

        let read = store.get::<String>("k").await.expect("get").expect("present");
        assert_eq!(read.freshness, Freshness::Fresh);
        assert_eq!(read.payload, "payload");

        clock.advance(Duration::from_secs(61));
        let read = store.get::<String>("k").await.expect("get").expect("present");
        assert_eq!(read.freshness, Freshness::Stale);

        clock.advance(Duration::from_secs(300));
        assert!(store.get::<String>("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_put_registers_pointers_with_entry_lifetime() {
        let (store, kv, clock) = store();
        let tags = vec!["list".to_string(), "list:tenant:t1".to_string()];
        store.put("k", &1u32, policy(), &tags).await.expect("put");

        for tag in &tags {
            assert!(kv.get(&pointer_key(tag, "k")).await.expect("get").is_some());
        }
        clock.advance(Duration::from_secs(360));
        for tag in &tags {
            assert!(kv.get(&pointer_key(tag, "k")).await.expect("get").is_none());
        }
    }

    #[tokio::test]
    async fn test_delete_leaves_pointers() {
        let (store, kv, _clock) = store();
        store
            .put("k", &1u32, policy(), &["t".to_string()])
            .await
            .expect("put");
        assert!(store.delete("k").await.expect("delete"));
        assert!(store.get::<u32>("k").await.expect("get").is_none());
        assert!(kv.get(&pointer_key("t", "k")).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_invalidate_tag_makes_entries_absent() {
        let (store, _kv, _clock) = store();
        for i in 0..5 {
            store
                .put(&format!("k{i}"), &i, policy(), &["list:tenant:t1".to_string()])
                .await
                .expect("put");
        }
        store
            .put("other", &9, policy(), &["list:tenant:t2".to_string()])
            .await
            .expect("put");

        let report = store.invalidate_tag("list:tenant:t1").await.expect("invalidate");
        assert_eq!(report.entries_removed, 5);
        for i in 0..5 {
            assert!(store.get::<i32>(&format!("k{i}")).await.expect("get").is_none());
        }
        assert!(store.get::<i32>("other").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_absent() {
        let (store, kv, _clock) = store();
        kv.set("k", b"{oops".to_vec(), Duration::from_secs(60))
            .await
            .expect("set");
        assert!(store.get::<u32>("k").await.expect("get").is_none());
        assert_eq!(kv.raw_len().await, 0);
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_as_cache_error() {
        let (store, kv, _clock) = store();
        kv.set_unavailable(true);
        let err = store.get::<u32>("k").await.expect_err("should fail");
        assert!(matches!(err, CacheError::Unavailable { .. }));
    }
}
