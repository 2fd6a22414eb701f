//! Background Jobs for the PromptVault service
//!
//! - `cache_warmer`: periodically primes single-prompt and list cache entries
//!
//! # Usage
//!
//! ```ignore
//! use promptvault_service::jobs::{cache_warmer_task, CacheWarmer, CacheWarmerConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let warmer = CacheWarmer::new(service.clone(), CacheWarmerConfig::from_env());
//! tokio::spawn(cache_warmer_task(warmer, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod cache_warmer;

pub use cache_warmer::{
    cache_warmer_task, CacheWarmer, CacheWarmerConfig, CacheWarmerMetrics, CacheWarmerSnapshot,
    WarmReport,
};
