//! Fuzz target for agent status document decoding.
//!
//! Decoding arbitrary bytes must never panic, only JSON objects may decode,
//! and any document that decodes must yield exactly the three status-derived
//! features.

#![no_main]

use af_common::{Feature, FeatureSet};
use af_core::AgentStatus;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(status) = AgentStatus::from_slice(data) else {
        return;
    };
    let document: serde_json::Value = serde_json::from_slice(data).expect("decoded input is JSON");
    assert!(document.is_object(), "non-object document decoded: {}", document);

    let mut set = FeatureSet::new();
    status.record_features(&mut set);

    assert_eq!(set.len(), 3);
    assert!(!set.contains(Feature::MonitorAggregation));
    assert!(set.status(Feature::L7Proxy).mode.is_empty());
    assert!(set.status(Feature::HostFirewall).mode.is_empty());
    let chaining = set.status(Feature::CniChaining);
    assert_eq!(chaining.enabled, !chaining.mode.is_empty());
});
