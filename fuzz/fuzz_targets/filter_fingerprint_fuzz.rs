//! Fuzz test for filter normalization
//!
//! Any JSON object accepted as a filter set must fingerprint the same after
//! a serialize/deserialize pass, whatever its key order or nesting.
//!
//! Run with: cargo +nightly fuzz run filter_fingerprint_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use pledge_core::FilterSet;

fuzz_target!(|data: &[u8]| {
    let Ok(map) = serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(data) else {
        return;
    };

    let filters = FilterSet::from(map);
    let canonical = filters.canonical_json();
    let reparsed: FilterSet = serde_json::from_str(&canonical).expect("canonical JSON parses");

    assert_eq!(reparsed.fingerprint(), filters.fingerprint());
    assert_eq!(filters.is_empty(), filters.fingerprint().is_none());
});
