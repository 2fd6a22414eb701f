//! Service Configuration Module
//!
//! Cache windows, pagination limits and the optional LMDB location.
//! Loaded from `PROMPTVAULT_*` environment variables; anything missing or
//! unparseable falls back to the defaults in [`crate::constants`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use promptvault_core::{Clock, ConfigError, VaultError, VaultResult};
use promptvault_storage::{CachePolicy, LmdbCacheError, LmdbKvBackend};

use crate::constants::{
    DEFAULT_INVALIDATION_SCAN_PAGE_SIZE, DEFAULT_LIST_CACHE_FRESH_SECS,
    DEFAULT_LIST_CACHE_STALE_SECS, DEFAULT_LMDB_MAP_SIZE_MB, DEFAULT_PROMPT_CACHE_FRESH_SECS,
    DEFAULT_PROMPT_CACHE_STALE_SECS, DEFAULT_VERSION_LIST_LIMIT, MAX_PAGE_SIZE,
};

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(key).unwrap_or(default))
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Configuration for [`crate::PromptService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Windows for single-prompt entries.
    pub prompt_cache: CachePolicy,

    /// Windows for list entries.
    pub list_cache: CachePolicy,

    /// Upper bound applied to every list query's page size.
    pub max_page_size: u32,

    /// Tag pointers fetched per invalidation scan page.
    pub invalidation_scan_page_size: usize,

    /// Version entries returned when the caller gives no limit.
    pub version_list_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            prompt_cache: CachePolicy::new(
                Duration::from_secs(DEFAULT_PROMPT_CACHE_FRESH_SECS),
                Duration::from_secs(DEFAULT_PROMPT_CACHE_STALE_SECS),
            ),
            list_cache: CachePolicy::new(
                Duration::from_secs(DEFAULT_LIST_CACHE_FRESH_SECS),
                Duration::from_secs(DEFAULT_LIST_CACHE_STALE_SECS),
            ),
            max_page_size: MAX_PAGE_SIZE,
            invalidation_scan_page_size: DEFAULT_INVALIDATION_SCAN_PAGE_SIZE,
            version_list_limit: DEFAULT_VERSION_LIST_LIMIT,
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PROMPTVAULT_PROMPT_CACHE_FRESH_SECS` (default: 60)
    /// - `PROMPTVAULT_PROMPT_CACHE_STALE_SECS` (default: 300)
    /// - `PROMPTVAULT_LIST_CACHE_FRESH_SECS` (default: 30)
    /// - `PROMPTVAULT_LIST_CACHE_STALE_SECS` (default: 120)
    /// - `PROMPTVAULT_MAX_PAGE_SIZE` (default: 100)
    /// - `PROMPTVAULT_INVALIDATION_SCAN_PAGE_SIZE` (default: 100)
    /// - `PROMPTVAULT_VERSION_LIST_LIMIT` (default: 50)
    pub fn from_env() -> Self {
        Self {
            prompt_cache: CachePolicy::new(
                env_secs(
                    "PROMPTVAULT_PROMPT_CACHE_FRESH_SECS",
                    DEFAULT_PROMPT_CACHE_FRESH_SECS,
                ),
                env_secs(
                    "PROMPTVAULT_PROMPT_CACHE_STALE_SECS",
                    DEFAULT_PROMPT_CACHE_STALE_SECS,
                ),
            ),
            list_cache: CachePolicy::new(
                env_secs("PROMPTVAULT_LIST_CACHE_FRESH_SECS", DEFAULT_LIST_CACHE_FRESH_SECS),
                env_secs("PROMPTVAULT_LIST_CACHE_STALE_SECS", DEFAULT_LIST_CACHE_STALE_SECS),
            ),
            max_page_size: env_parse("PROMPTVAULT_MAX_PAGE_SIZE").unwrap_or(MAX_PAGE_SIZE),
            invalidation_scan_page_size: env_parse("PROMPTVAULT_INVALIDATION_SCAN_PAGE_SIZE")
                .unwrap_or(DEFAULT_INVALIDATION_SCAN_PAGE_SIZE),
            version_list_limit: env_parse("PROMPTVAULT_VERSION_LIST_LIMIT")
                .unwrap_or(DEFAULT_VERSION_LIST_LIMIT),
        }
    }

    /// Short windows for local development.
    pub fn development() -> Self {
        Self {
            prompt_cache: CachePolicy::new(Duration::from_secs(5), Duration::from_secs(30)),
            list_cache: CachePolicy::new(Duration::from_secs(2), Duration::from_secs(10)),
            invalidation_scan_page_size: 10,
            ..Self::default()
        }
    }

    pub fn with_prompt_cache(mut self, fresh: Duration, stale: Duration) -> Self {
        self.prompt_cache = CachePolicy::new(fresh, stale);
        self
    }

    pub fn with_list_cache(mut self, fresh: Duration, stale: Duration) -> Self {
        self.list_cache = CachePolicy::new(fresh, stale);
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn with_invalidation_scan_page_size(mut self, size: usize) -> Self {
        self.invalidation_scan_page_size = size;
        self
    }

    pub fn with_version_list_limit(mut self, limit: usize) -> Self {
        self.version_list_limit = limit;
        self
    }

    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> VaultResult<()> {
        if self.prompt_cache.fresh.is_zero() {
            return Err(invalid(
                "prompt_cache.fresh",
                format!("{:?}", self.prompt_cache.fresh),
                "fresh window must be greater than 0",
            ));
        }
        if self.list_cache.fresh.is_zero() {
            return Err(invalid(
                "list_cache.fresh",
                format!("{:?}", self.list_cache.fresh),
                "fresh window must be greater than 0",
            ));
        }
        if self.max_page_size == 0 {
            return Err(invalid(
                "max_page_size",
                self.max_page_size.to_string(),
                "max_page_size must be greater than 0",
            ));
        }
        if self.invalidation_scan_page_size == 0 {
            return Err(invalid(
                "invalidation_scan_page_size",
                self.invalidation_scan_page_size.to_string(),
                "invalidation_scan_page_size must be greater than 0",
            ));
        }
        if self.version_list_limit == 0 {
            return Err(invalid(
                "version_list_limit",
                self.version_list_limit.to_string(),
                "version_list_limit must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> VaultError {
    VaultError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

// ============================================================================
// LMDB CONFIGURATION
// ============================================================================

/// Location and size of the LMDB cache environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbConfig {
    pub path: PathBuf,
    pub map_size_mb: usize,
}

impl LmdbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map_size_mb: DEFAULT_LMDB_MAP_SIZE_MB,
        }
    }

    pub fn with_map_size_mb(mut self, map_size_mb: usize) -> Self {
        self.map_size_mb = map_size_mb;
        self
    }

    /// Read `PROMPTVAULT_LMDB_PATH` and `PROMPTVAULT_LMDB_MAP_SIZE_MB`.
    ///
    /// `None` when no path is configured.
    pub fn from_env() -> Option<Self> {
        let path = std::env::var("PROMPTVAULT_LMDB_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())?;
        Some(Self {
            path: PathBuf::from(path),
            map_size_mb: env_parse("PROMPTVAULT_LMDB_MAP_SIZE_MB")
                .unwrap_or(DEFAULT_LMDB_MAP_SIZE_MB),
        })
    }

    /// Open the LMDB backend described by this config.
    pub fn open(&self, clock: Arc<dyn Clock>) -> Result<LmdbKvBackend, LmdbCacheError> {
        LmdbKvBackend::open(&self.path, self.map_size_mb, clock)
    }
}
