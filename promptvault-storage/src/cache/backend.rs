//! Key-value backend trait.
//!
//! This module defines the trait that cache backends must implement. The
//! envelope store and the tag index are written purely against it, so the
//! same cache semantics run over LMDB, an in-memory map, or a networked
//! key-value server.

use async_trait::async_trait;
use promptvault_core::CacheResult;
use std::time::Duration;

/// One page of a prefix scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Matching keys in ascending order.
    pub keys: Vec<String>,
    /// Cursor for the next page, or `None` when the scan is exhausted.
    pub next_cursor: Option<String>,
}

/// Key-value backend with per-entry lifetimes and cursor-based prefix scans.
///
/// # Expiry
///
/// Entries written with a `ttl` must be invisible to `get` and
/// `scan_prefix` once the TTL has elapsed, whether or not the backend has
/// physically removed them yet.
///
/// # Scans
///
/// `scan_prefix` returns keys strictly greater than `cursor` in ascending
/// order. Deleting keys that were already returned must not disturb later
/// pages, which lets callers delete while they paginate.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Get raw bytes for `key`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Remove `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Scan up to `count` live keys beginning with `prefix`.
    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> CacheResult<ScanPage>;
}

/// Build the scan page for keys collected in order, given the requested size.
pub(crate) fn page_from_keys(keys: Vec<String>, count: usize) -> ScanPage {
    let next_cursor = if count > 0 && keys.len() == count {
        keys.last().cloned()
    } else {
        None
    };
    ScanPage { keys, next_cursor }
}
