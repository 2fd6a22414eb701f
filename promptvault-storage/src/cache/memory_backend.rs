//! In-memory key-value backend.
//!
//! Stand-in for a shared key-value server in tests and single-process
//! deployments. Expiry is evaluated against the injected [`Clock`], and the
//! backend can be switched into an "unavailable" mode to exercise the
//! cache-degrades-to-store paths.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use promptvault_core::{CacheError, CacheResult, Clock, Timestamp};
use tokio::sync::RwLock;

use super::backend::{page_from_keys, KvBackend, ScanPage};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Timestamp,
}

/// Ordered in-memory backend with clock-driven expiry.
#[derive(Debug)]
pub struct InMemoryKvBackend {
    entries: RwLock<BTreeMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryKvBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with [`CacheError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of physically stored entries, expired or not.
    pub async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                reason: "in-memory backend marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn expiry(&self, ttl: Duration) -> Timestamp {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
    }
}

#[async_trait]
impl KvBackend for InMemoryKvBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.check_available()?;
        let expires_at = self.expiry(ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.map(|entry| entry.expires_at > now).unwrap_or(false))
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> CacheResult<ScanPage> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;

        let start = match cursor {
            Some(cursor) if cursor >= prefix => Bound::Excluded(cursor),
            _ => Bound::Included(prefix),
        };

        let keys: Vec<String> = entries
            .range::<str, _>((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .take(count)
            .collect();

        Ok(page_from_keys(keys, count))
    }
}
