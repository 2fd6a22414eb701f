//! Fuzz test for list cache keys
//!
//! Splits arbitrary input into `name=value` dimensions and checks that the
//! derived key does not depend on dimension order and never lets a value
//! forge an extra dimension.
//!
//! Run with: cargo +nightly fuzz run list_key_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use promptvault_core::{ListQueryKey, LIST_KEY_PREFIX};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let dims: Vec<(&str, &str)> = input
        .split('\n')
        .filter_map(|line| line.split_once('\t'))
        .collect();

    let forward = ListQueryKey::from_dimensions(dims.iter().copied());
    let reversed = ListQueryKey::from_dimensions(dims.iter().rev().copied());
    assert_eq!(forward, reversed, "Key must not depend on dimension order");

    assert!(forward.as_str().starts_with(LIST_KEY_PREFIX));

    // Escaped components: one '=' per dimension, '&' only between them.
    let body = &forward.as_str()[LIST_KEY_PREFIX.len()..];
    if !dims.is_empty() {
        assert_eq!(body.matches('=').count(), dims.len());
        assert_eq!(body.matches('&').count(), dims.len() - 1);
    }
});
