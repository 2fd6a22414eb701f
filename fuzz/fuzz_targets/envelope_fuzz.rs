//! Fuzz test for cache entry decoding
//!
//! Cache rows come from a shared store other processes write to. Decoding
//! an envelope or a tag pointer from arbitrary bytes must fail cleanly, and
//! classifying a decoded envelope must never panic.
//!
//! Run with: cargo +nightly fuzz run envelope_fuzz -- -max_total_time=60

#![no_main]

use chrono::{DateTime, Utc};
use libfuzzer_sys::fuzz_target;
use promptvault_storage::{CacheEnvelope, Freshness, TagPointer};

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = serde_json::from_slice::<CacheEnvelope<serde_json::Value>>(data) {
        let probes = [
            DateTime::<Utc>::UNIX_EPOCH,
            envelope.cached_at,
            envelope.expires_at,
            envelope.stale_at,
        ];
        for now in probes {
            match envelope.freshness_at(now) {
                Some(Freshness::Fresh) => assert!(now < envelope.expires_at),
                Some(Freshness::Stale) => assert!(now < envelope.stale_at),
                None => assert!(now >= envelope.stale_at),
            }
        }
    }

    if let Ok(pointer) = serde_json::from_slice::<TagPointer>(data) {
        let key = pointer.key();
        assert!(key.starts_with("tag:"));
        assert!(key.ends_with(&pointer.cache_key));
    }
});
