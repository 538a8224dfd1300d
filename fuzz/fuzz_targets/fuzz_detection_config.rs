//! Fuzz target for agent-features.toml parsing.
//!
//! Parsing and validating arbitrary text must never panic. A config that
//! parses must survive a serialize/parse round trip unchanged.

#![no_main]

use af_config::{validate_config, DetectionConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = DetectionConfig::from_toml_str(text) else {
        return;
    };

    let _ = validate_config(&config);

    if let Ok(rendered) = config.to_toml_string() {
        let reparsed = DetectionConfig::from_toml_str(&rendered);
        assert_eq!(reparsed.ok(), Some(config));
    }
});
