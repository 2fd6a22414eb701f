//! PromptVault Service
//!
//! Cache-transparent prompt operations over a source-of-truth store:
//! stale-while-revalidate reads, tag-driven invalidation on every mutation,
//! the version ledger, and a gated cache warmer.
//!
//! # Example
//!
//! ```ignore
//! let service = PromptService::new(store.clone(), store, backend, clock, ids, ServiceConfig::from_env())?;
//!
//! let prompt = service.create_prompt(NewPrompt::new("t1", "Greeting", "Hello", "alice")).await?;
//! let page = service.list_prompts(ListQuery::new("t1")).await?;
//! ```

pub mod config;
pub mod constants;
pub mod jobs;
pub mod service;
pub mod telemetry;

pub use config::{LmdbConfig, ServiceConfig};
pub use jobs::{cache_warmer_task, CacheWarmer, CacheWarmerConfig, WarmReport};
pub use service::{BulkReport, PromptService};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
