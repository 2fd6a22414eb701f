//! LMDB-backed key-value backend.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped,
//! process-local store for cache envelopes and tag pointers.
//!
//! # Value Layout
//!
//! Every value is framed as `[expires_at_ms: 8 bytes LE][payload]`. LMDB has
//! no native expiry, so expired rows stay on disk until they are read,
//! deleted, or swept by [`LmdbKvBackend::purge_expired`], and are invisible
//! in the meantime.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Read transactions serve `get` and scans,
//! write transactions serve `set` and `delete`. No transaction is held across
//! an await point.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use promptvault_core::{CacheError, CacheResult, Clock};

use super::backend::{page_from_keys, KvBackend, ScanPage};

const EXPIRY_HEADER_LEN: usize = 8;

/// Error type for LMDB backend operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value shorter than its expiry header.
    #[error("Corrupt value for key {key}")]
    CorruptValue { key: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(_) | LmdbCacheError::Io(_) => CacheError::Unavailable {
                reason: e.to_string(),
            },
            _ => CacheError::Backend {
                reason: e.to_string(),
            },
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB key-value backend with clock-driven expiry.
///
/// # Example
///
/// ```ignore
/// use promptvault_storage::cache::LmdbKvBackend;
/// use promptvault_core::SystemClock;
/// use std::sync::Arc;
///
/// let backend = LmdbKvBackend::open("/tmp/promptvault-cache", 100, Arc::new(SystemClock))?;
/// backend.set("prompt:1", bytes, Duration::from_secs(360)).await?;
/// ```
pub struct LmdbKvBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LmdbKvBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbKvBackend")
            .field("path", &self.env.path())
            .finish_non_exhaustive()
    }
}

impl LmdbKvBackend {
    /// Open (or create) an LMDB backend rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, db, clock })
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn expires_at_millis(&self, ttl: Duration) -> i64 {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.now_millis().saturating_add(ttl_ms)
    }

    fn split_value<'a>(key: &str, raw: &'a [u8]) -> Result<(i64, &'a [u8]), LmdbCacheError> {
        if raw.len() < EXPIRY_HEADER_LEN {
            return Err(LmdbCacheError::CorruptValue {
                key: key.to_string(),
            });
        }
        let (header, payload) = raw.split_at(EXPIRY_HEADER_LEN);
        let header: [u8; EXPIRY_HEADER_LEN] =
            header
                .try_into()
                .map_err(|_| LmdbCacheError::CorruptValue {
                    key: key.to_string(),
                })?;
        Ok((i64::from_le_bytes(header), payload))
    }

    fn is_live(raw: &[u8], now_ms: i64) -> bool {
        raw.len() >= EXPIRY_HEADER_LEN
            && raw[..EXPIRY_HEADER_LEN]
                .try_into()
                .map(|h: [u8; EXPIRY_HEADER_LEN]| i64::from_le_bytes(h) > now_ms)
                .unwrap_or(false)
    }

    fn remove_key(&self, key: &str) -> Result<(), LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)
    }

    /// Physically delete every expired row. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let now = self.now_millis();
        let expired: Vec<Vec<u8>> = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let iter = self.db.iter(&rtxn).map_err(txn_err)?;
            let mut keys = Vec::new();
            for result in iter {
                let (key, value) = result.map_err(txn_err)?;
                if !Self::is_live(value, now) {
                    keys.push(key.to_vec());
                }
            }
            keys
        };

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut removed = 0u64;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }
}

#[async_trait]
impl KvBackend for LmdbKvBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = self.now_millis();
        let found = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
                Some(raw) => {
                    let (expires_at, payload) = Self::split_value(key, raw)?;
                    Some((expires_at > now).then(|| payload.to_vec()))
                }
                None => None,
            }
        };

        match found {
            Some(Some(payload)) => Ok(Some(payload)),
            Some(None) => {
                // Lazily drop the expired row.
                self.remove_key(key)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let expires_at = self.expires_at_millis(ttl);
        let mut framed = Vec::with_capacity(EXPIRY_HEADER_LEN + value.len());
        framed.extend_from_slice(&expires_at.to_le_bytes());
        framed.extend_from_slice(&value);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &framed)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = self.now_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let was_live = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(txn_err)?
            .map(|raw| Self::is_live(raw, now))
            .unwrap_or(false);
        self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(was_live)
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> CacheResult<ScanPage> {
        let now = self.now_millis();
        let prefix = prefix.as_bytes();
        // Resume strictly after the cursor instead of rescanning the prefix.
        let lower = match cursor.map(str::as_bytes) {
            Some(cursor) if cursor >= prefix => Bound::Excluded(cursor),
            _ => Bound::Included(prefix),
        };
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let iter = self
            .db
            .range(&rtxn, &(lower, Bound::Unbounded))
            .map_err(txn_err)?;

        let mut keys = Vec::new();
        for result in iter {
            if keys.len() >= count {
                break;
            }
            let (raw_key, value) = result.map_err(txn_err)?;
            if !raw_key.starts_with(prefix) {
                break;
            }
            if !Self::is_live(value, now) {
                continue;
            }
            match std::str::from_utf8(raw_key) {
                Ok(key) => keys.push(key.to_string()),
                Err(_) => continue,
            }
        }

        Ok(page_from_keys(keys, count))
    }
}
