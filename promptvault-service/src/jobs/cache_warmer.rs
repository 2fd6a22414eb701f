//! Cache Warmer Background Task
//!
//! Primes the cache so the first reads after a quiet period are hits. Per
//! tenant it:
//!
//! - evicts and repopulates the single-prompt entries of the most recently
//!   updated, non-archived prompts;
//! - runs the default list query (most recent first, default page size).
//!
//! # Gate
//!
//! A shared key ([`WARM_GATE_KEY`]) holds the time of the last run. A run
//! only proceeds when at least `warm_interval` has passed. The read and the
//! write of the gate are not atomic, so two instances may both pass and warm
//! twice; warming is idempotent, so that only costs work.
//!
//! Warming never fails its caller. Every error is logged and counted.
//!
//! # Configuration
//!
//! ```rust
//! use promptvault_service::jobs::CacheWarmerConfig;
//! use std::time::Duration;
//!
//! let config = CacheWarmerConfig {
//!     warm_interval: Duration::from_secs(900), // At most one run per 15 minutes
//!     records_per_tenant: 5,                   // Warm the 5 most recent prompts
//!     tick_interval: Duration::from_secs(60),  // Check the gate every minute
//!     enabled: true,
//! };
//! ```

use crate::constants::{
    DEFAULT_WARM_INTERVAL_SECS, DEFAULT_WARM_RECORDS_PER_TENANT, DEFAULT_WARM_TICK_SECS,
};
use crate::service::PromptService;
use promptvault_core::{
    ListQuery, ScanFilter, ScanRequest, SortField, SortOrder, TenantId, WARM_GATE_KEY,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the cache warmer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWarmerConfig {
    /// Minimum time between two warm runs (default: 15 minutes)
    pub warm_interval: Duration,

    /// Most recently updated prompts warmed per tenant (default: 5)
    pub records_per_tenant: u32,

    /// How often the periodic task checks the gate (default: 60 seconds)
    pub tick_interval: Duration,

    /// Whether warming runs at all (default: true)
    pub enabled: bool,
}

impl Default for CacheWarmerConfig {
    fn default() -> Self {
        Self {
            warm_interval: Duration::from_secs(DEFAULT_WARM_INTERVAL_SECS),
            records_per_tenant: DEFAULT_WARM_RECORDS_PER_TENANT,
            tick_interval: Duration::from_secs(DEFAULT_WARM_TICK_SECS),
            enabled: true,
        }
    }
}

impl CacheWarmerConfig {
    /// Create CacheWarmerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `PROMPTVAULT_WARM_INTERVAL_SECS`: Minimum time between runs (default: 900)
    /// - `PROMPTVAULT_WARM_RECORDS_PER_TENANT`: Prompts warmed per tenant (default: 5)
    /// - `PROMPTVAULT_WARM_TICK_SECS`: Gate check interval (default: 60)
    /// - `PROMPTVAULT_WARM_ENABLED`: Whether to warm at all (default: true)
    pub fn from_env() -> Self {
        let warm_interval = Duration::from_secs(
            std::env::var("PROMPTVAULT_WARM_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WARM_INTERVAL_SECS),
        );

        let records_per_tenant = std::env::var("PROMPTVAULT_WARM_RECORDS_PER_TENANT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WARM_RECORDS_PER_TENANT);

        let tick_interval = Duration::from_secs(
            std::env::var("PROMPTVAULT_WARM_TICK_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WARM_TICK_SECS),
        );

        let enabled = std::env::var("PROMPTVAULT_WARM_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            warm_interval,
            records_per_tenant,
            tick_interval,
            enabled,
        }
    }

    /// Short intervals for development/testing.
    pub fn development() -> Self {
        Self {
            warm_interval: Duration::from_secs(30),
            records_per_tenant: DEFAULT_WARM_RECORDS_PER_TENANT,
            tick_interval: Duration::from_secs(5),
            enabled: true,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Metrics for cache warming.
#[derive(Debug, Default)]
pub struct CacheWarmerMetrics {
    /// Runs that passed the gate
    pub warm_runs: AtomicU64,

    /// Runs skipped because the gate was closed or unreadable
    pub gate_skips: AtomicU64,

    /// Single-prompt entries repopulated
    pub records_warmed: AtomicU64,

    /// Default list queries primed
    pub lists_warmed: AtomicU64,

    /// Errors encountered while warming
    pub warm_errors: AtomicU64,
}

impl CacheWarmerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> CacheWarmerSnapshot {
        CacheWarmerSnapshot {
            warm_runs: self.warm_runs.load(Ordering::Relaxed),
            gate_skips: self.gate_skips.load(Ordering::Relaxed),
            records_warmed: self.records_warmed.load(Ordering::Relaxed),
            lists_warmed: self.lists_warmed.load(Ordering::Relaxed),
            warm_errors: self.warm_errors.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: &WarmReport) {
        self.warm_runs.fetch_add(1, Ordering::Relaxed);
        self.records_warmed
            .fetch_add(report.records_warmed, Ordering::Relaxed);
        self.lists_warmed
            .fetch_add(report.lists_warmed, Ordering::Relaxed);
        self.warm_errors.fetch_add(report.failures, Ordering::Relaxed);
    }
}

/// Snapshot of warmer metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheWarmerSnapshot {
    pub warm_runs: u64,
    pub gate_skips: u64,
    pub records_warmed: u64,
    pub lists_warmed: u64,
    pub warm_errors: u64,
}

/// Result of one warm run that passed the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub tenants: u64,
    pub records_warmed: u64,
    pub lists_warmed: u64,
    pub failures: u64,
}

// ============================================================================
// WARMER
// ============================================================================

/// Gated cache warmer over a [`PromptService`].
#[derive(Debug, Clone)]
pub struct CacheWarmer {
    service: PromptService,
    config: CacheWarmerConfig,
    metrics: Arc<CacheWarmerMetrics>,
}

impl CacheWarmer {
    pub fn new(service: PromptService, config: CacheWarmerConfig) -> Self {
        Self {
            service,
            config,
            metrics: Arc::new(CacheWarmerMetrics::new()),
        }
    }

    pub fn config(&self) -> &CacheWarmerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<CacheWarmerMetrics> {
        self.metrics.clone()
    }

    /// Warm `tenants` if the gate is open.
    ///
    /// `None` when warming is disabled or the gate is closed.
    pub async fn maybe_warm(&self, tenants: &[TenantId]) -> Option<WarmReport> {
        if !self.config.enabled || !self.pass_gate().await {
            return None;
        }

        let mut report = WarmReport::default();
        for tenant_id in tenants {
            self.warm_tenant(tenant_id, &mut report).await;
        }
        self.metrics.record(&report);

        tracing::info!(
            tenants = report.tenants,
            records_warmed = report.records_warmed,
            lists_warmed = report.lists_warmed,
            failures = report.failures,
            "Cache warm run completed"
        );
        Some(report)
    }

    /// Warm every tenant known to the store, if the gate is open.
    pub async fn maybe_warm_all(&self) -> Option<WarmReport> {
        if !self.config.enabled {
            return None;
        }
        match self.service.store().distinct_tenants().await {
            Ok(tenants) => self.maybe_warm(&tenants).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list tenants for cache warming");
                self.metrics.warm_errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Fire-and-forget [`Self::maybe_warm`] for request handlers.
    pub fn trigger(&self, tenants: Vec<TenantId>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available; skipping cache warm trigger");
            return;
        };
        let warmer = self.clone();
        handle.spawn(async move {
            warmer.maybe_warm(&tenants).await;
        });
    }

    /// Check the shared gate and, if open, close it for `warm_interval`.
    async fn pass_gate(&self) -> bool {
        let backend = self.service.cache().backend();
        let now_ms = self.service.clock().now().timestamp_millis();
        let interval_ms = i64::try_from(self.config.warm_interval.as_millis()).unwrap_or(i64::MAX);

        let last_ms = match backend.get(WARM_GATE_KEY).await {
            Ok(raw) => raw
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|s| s.parse::<i64>().ok()),
            Err(e) => {
                tracing::warn!(error = %e, "Warm gate unreadable; skipping warm run");
                self.metrics.gate_skips.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        if let Some(last_ms) = last_ms {
            if now_ms.saturating_sub(last_ms) < interval_ms {
                tracing::trace!(last_ms, now_ms, "Warm gate closed");
                self.metrics.gate_skips.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        let ttl = self.config.warm_interval.saturating_mul(2);
        if let Err(e) = backend
            .set(WARM_GATE_KEY, now_ms.to_string().into_bytes(), ttl)
            .await
        {
            tracing::warn!(error = %e, "Failed to record warm gate; warming anyway");
        }
        true
    }

    async fn warm_tenant(&self, tenant_id: &TenantId, report: &mut WarmReport) {
        report.tenants += 1;

        let request = ScanRequest {
            filter: ScanFilter::for_tenant(tenant_id.clone()),
            sort: SortField::UpdatedAt,
            order: SortOrder::Desc,
            page: 1,
            page_size: self.config.records_per_tenant,
        };

        match self.service.store().scan(&request).await {
            Ok(result) => {
                for prompt in &result.rows {
                    if self.service.refresh_prompt_entry(prompt).await {
                        report.records_warmed += 1;
                    } else {
                        report.failures += 1;
                    }
                }
            }
            Err(e) => {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Failed to load prompts to warm");
                report.failures += 1;
            }
        }

        match self.service.list_prompts(ListQuery::new(tenant_id.clone())).await {
            Ok(_) => report.lists_warmed += 1,
            Err(e) => {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Failed to warm default list");
                report.failures += 1;
            }
        }
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically warms every tenant.
///
/// Runs until the shutdown signal is received. Each tick calls
/// [`CacheWarmer::maybe_warm_all`], so the gate decides whether a tick does
/// any work.
///
/// # Example
///
/// ```ignore
/// use tokio::sync::watch;
///
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let warmer = CacheWarmer::new(service.clone(), CacheWarmerConfig::from_env());
///
/// let handle = tokio::spawn(cache_warmer_task(warmer, shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn cache_warmer_task(
    warmer: CacheWarmer,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheWarmerMetrics> {
    let metrics = warmer.metrics();

    let mut tick = interval(warmer.config.tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        tick_interval_secs = warmer.config.tick_interval.as_secs(),
        warm_interval_secs = warmer.config.warm_interval.as_secs(),
        records_per_tenant = warmer.config.records_per_tenant,
        "Cache warmer task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Cache warmer task shutting down");
                    break;
                }
            }

            _ = tick.tick() => {
                warmer.maybe_warm_all().await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        warm_runs = snapshot.warm_runs,
        gate_skips = snapshot.gate_skips,
        records_warmed = snapshot.records_warmed,
        lists_warmed = snapshot.lists_warmed,
        warm_errors = snapshot.warm_errors,
        "Cache warmer task completed"
    );

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheWarmerConfig::default();
        assert_eq!(config.warm_interval, Duration::from_secs(900));
        assert_eq!(config.records_per_tenant, 5);
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert!(config.enabled);
    }

    #[test]
    fn test_development_config_is_shorter() {
        let dev = CacheWarmerConfig::development();
        assert!(dev.warm_interval < CacheWarmerConfig::default().warm_interval);
        assert!(dev.tick_interval < CacheWarmerConfig::default().tick_interval);
    }

    #[test]
    fn test_metrics_record_report() {
        let metrics = CacheWarmerMetrics::new();
        metrics.record(&WarmReport {
            tenants: 2,
            records_warmed: 7,
            lists_warmed: 2,
            failures: 1,
        });
        let snap = metrics.snapshot();
        assert_eq!(snap.warm_runs, 1);
        assert_eq!(snap.records_warmed, 7);
        assert_eq!(snap.lists_warmed, 2);
        assert_eq!(snap.warm_errors, 1);
    }
}
