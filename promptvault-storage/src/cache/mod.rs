//! Stale-while-revalidate cache layer with tag-based invalidation.
//!
//! # Layers
//!
//! - [`KvBackend`]: raw bytes with per-entry lifetimes and prefix scans.
//!   Implemented by [`InMemoryKvBackend`] and [`LmdbKvBackend`].
//! - [`EnvelopeStore`]: typed payloads wrapped in [`CacheEnvelope`]s that
//!   carry fresh and stale windows, plus tag pointers for invalidation.
//!
//! # Example
//!
//! ```ignore
//! let cache = EnvelopeStore::new(backend, clock);
//! cache.put("prompt:1", &prompt, policy, &tags).await?;
//!
//! match cache.get::<Prompt>("prompt:1").await? {
//!     Some(read) if read.freshness.is_fresh() => serve(read.payload),
//!     Some(read) => { schedule_rebuild(); serve(read.payload) }
//!     None => compute_and_put().await?,
//! }
//! ```

pub mod backend;
pub mod envelope;
pub mod envelope_store;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod metrics;
pub mod tag_index;

pub use backend::{KvBackend, ScanPage};
pub use envelope::{CacheEnvelope, CachePolicy, CacheRead, Freshness};
pub use envelope_store::EnvelopeStore;
pub use lmdb_backend::{LmdbCacheError, LmdbKvBackend};
pub use memory_backend::InMemoryKvBackend;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use tag_index::{InvalidationReport, TagPointer, DEFAULT_SCAN_PAGE_SIZE};
