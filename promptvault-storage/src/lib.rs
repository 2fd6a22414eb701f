//! PromptVault Storage
//!
//! Cache layer (envelopes, tag index, key-value backends), the source-of-truth
//! store seams, and the version ledger manager.

pub mod cache;
pub mod ledger;
pub mod memory;
pub mod store;

pub use cache::{
    CacheEnvelope, CacheMetrics, CacheMetricsSnapshot, CachePolicy, CacheRead, EnvelopeStore,
    Freshness, InMemoryKvBackend, InvalidationReport, KvBackend, LmdbCacheError, LmdbKvBackend,
    ScanPage, TagPointer,
};
pub use ledger::VersionLedger;
pub use memory::InMemoryPromptStore;
pub use store::{PromptSearch, PromptStore, ScanResult, SearchResult};
