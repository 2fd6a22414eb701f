//! Constants for the PromptVault service
//!
//! Every default used by [`crate::config`] and [`crate::jobs`] lives here.

// ============================================================================
// SINGLE-PROMPT CACHE
// ============================================================================

/// Fresh window of a single-prompt entry (1 minute)
pub const DEFAULT_PROMPT_CACHE_FRESH_SECS: u64 = 60;

/// Stale window of a single-prompt entry (5 minutes)
pub const DEFAULT_PROMPT_CACHE_STALE_SECS: u64 = 300;

// ============================================================================
// LIST CACHE
// ============================================================================

/// Fresh window of a list entry (30 seconds)
pub const DEFAULT_LIST_CACHE_FRESH_SECS: u64 = 30;

/// Stale window of a list entry (2 minutes)
pub const DEFAULT_LIST_CACHE_STALE_SECS: u64 = 120;

// ============================================================================
// PAGINATION
// ============================================================================

/// Maximum page size for list operations
pub const MAX_PAGE_SIZE: u32 = 100;

/// Tag pointers fetched per invalidation scan page
pub const DEFAULT_INVALIDATION_SCAN_PAGE_SIZE: usize = 100;

/// Version entries returned when the caller gives no limit
pub const DEFAULT_VERSION_LIST_LIMIT: usize = 50;

// ============================================================================
// CACHE WARMER
// ============================================================================

/// Minimum time between two warm runs (15 minutes)
pub const DEFAULT_WARM_INTERVAL_SECS: u64 = 900;

/// Most recently updated prompts warmed per tenant
pub const DEFAULT_WARM_RECORDS_PER_TENANT: u32 = 5;

/// How often the periodic warmer checks the gate (1 minute)
pub const DEFAULT_WARM_TICK_SECS: u64 = 60;

// ============================================================================
// LMDB
// ============================================================================

/// Default LMDB map size in megabytes
pub const DEFAULT_LMDB_MAP_SIZE_MB: usize = 256;

// ============================================================================
// TELEMETRY
// ============================================================================

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "promptvault=debug,info";
