//! Cache envelopes and freshness classification.
//!
//! Every cached payload is wrapped in a [`CacheEnvelope`] that records when
//! it was cached and when it stops being fresh and stops being servable.
//! Readers get a [`CacheRead`] that says which of the two windows they hit,
//! so the stale-while-revalidate decision is made explicitly by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How current a cache read is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Inside the fresh window: serve without recomputing.
    Fresh,
    /// Past the fresh window but inside the stale window: serve, then refresh.
    Stale,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

/// Fresh and stale windows for one kind of cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub fresh: Duration,
    pub stale: Duration,
}

impl CachePolicy {
    pub const fn new(fresh: Duration, stale: Duration) -> Self {
        Self { fresh, stale }
    }

    /// Lifetime of the entry (and its tag pointers) in the backend.
    pub fn total(&self) -> Duration {
        self.fresh.saturating_add(self.stale)
    }
}

/// Stored wrapper around a cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub payload: T,
    pub cached_at: DateTime<Utc>,
    /// End of the fresh window.
    pub expires_at: DateTime<Utc>,
    /// End of the stale window; the entry is absent from here on.
    pub stale_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T, cached_at: DateTime<Utc>, policy: CachePolicy, tags: Vec<String>) -> Self {
        let expires_at = add_saturating(cached_at, policy.fresh);
        let stale_at = add_saturating(cached_at, policy.total());
        Self {
            payload,
            cached_at,
            expires_at,
            stale_at,
            tags,
        }
    }

    /// Classify the envelope at `now`. `None` means absent.
    pub fn freshness_at(&self, now: DateTime<Utc>) -> Option<Freshness> {
        if now >= self.stale_at {
            None
        } else if now < self.expires_at {
            Some(Freshness::Fresh)
        } else {
            Some(Freshness::Stale)
        }
    }
}

fn add_saturating(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Result of a cache lookup that found a servable entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    pub payload: T,
    pub freshness: Freshness,
    pub cached_at: DateTime<Utc>,
}

impl<T> CacheRead<T> {
    /// Consume the wrapper and return the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// How long ago the payload was cached, relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CachePolicy {
        CachePolicy::new(Duration::from_secs(60), Duration::from_secs(300))
    }

    #[test]
    fn test_envelope_windows() {
        let now = Utc::now();
        let env = CacheEnvelope::new(1u8, now, policy(), vec![]);
        assert_eq!(env.expires_at - env.cached_at, chrono::Duration::seconds(60));
        assert_eq!(env.stale_at - env.cached_at, chrono::Duration::seconds(360));
    }

    #[test]
    fn test_freshness_boundaries() {
        let now = Utc::now();
        let env = CacheEnvelope::new(1u8, now, policy(), vec![]);
        assert_eq!(env.freshness_at(now), Some(Freshness::Fresh));
        assert_eq!(
            env.freshness_at(now + chrono::Duration::seconds(59)),
            Some(Freshness::Fresh)
        );
        assert_eq!(
            env.freshness_at(now + chrono::Duration::seconds(60)),
            Some(Freshness::Stale)
        );
        assert_eq!(
            env.freshness_at(now + chrono::Duration::seconds(359)),
            Some(Freshness::Stale)
        );
        assert_eq!(env.freshness_at(now + chrono::Duration::seconds(360)), None);
    }

    #[test]
    fn test_zero_stale_window_has_no_stale_phase() {
        let now = Utc::now();
        let env = CacheEnvelope::new(
            1u8,
            now,
            CachePolicy::new(Duration::from_secs(10), Duration::ZERO),
            vec![],
        );
        assert_eq!(env.freshness_at(now + chrono::Duration::seconds(10)), None);
    }

    #[test]
    fn test_envelope_serde_shape() {
        let now = Utc::now();
        let env = CacheEnvelope::new("x".to_string(), now, policy(), vec!["list".into()]);
        let json = serde_json::to_value(&env).expect("serialize");
        assert!(json.get("payload").is_some());
        assert!(json.get("stale_at").is_some());
        assert_eq!(json["tags"][0], "list");
    }

    #[test]
    fn test_cache_read_age() {
        let now = Utc::now();
        let read = CacheRead {
            payload: (),
            freshness: Freshness::Stale,
            cached_at: now - chrono::Duration::seconds(90),
        };
        assert_eq!(read.age(now), Duration::from_secs(90));
        assert!(read.freshness.is_stale());
    }
}
