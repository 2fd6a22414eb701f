//! PromptVault Core - Entity Types
//!
//! Pure data structures and pure functions. All other crates depend on this.
//! Nothing here performs I/O: stores, caches and clocks are reached through
//! the seams defined in `promptvault-storage` and [`Clock`].

pub mod changeset;
pub mod entities;
pub mod error;
pub mod filter;
pub mod identity;
pub mod keys;
pub mod query;

pub use changeset::{
    apply_changeset, normalize_metadata, normalize_tags, MutationOutcome, PromptChangeset,
};
pub use entities::{NewPrompt, Prompt, UsageEvent, VersionEntry};
pub use error::{
    CacheError, CacheResult, ConfigError, EntityKind, LedgerError, StorageError, ValidationError,
    VaultError, VaultResult,
};
pub use filter::{metadata_matches, tags_match, ScanFilter, ScanRequest, SearchRequest};
pub use identity::{
    Clock, IdGenerator, ManualClock, PromptId, SystemClock, TenantId, Timestamp, UsageEventId,
    UuidV7Generator, VersionEntryId,
};
pub use keys::{
    list_tags, prompt_cache_key, prompt_tag, prompt_tags, tenant_list_tag, tenant_search_tag,
    tenant_tag, LIST_TAG, WARM_GATE_KEY,
};
pub use query::{
    ListPage, ListQuery, ListQueryKey, PaginatedResult, PromptHit, SortField, SortOrder,
    DEFAULT_PAGE_SIZE, LIST_KEY_PREFIX,
};
