//! Fuzz target for requirement matching.
//!
//! Matching a requirement list must agree with a table built straight from
//! the raw input: last status per feature wins, absent features read as
//! disabled with an empty mode, and every requirement must hold.

#![no_main]

use af_common::{Feature, FeatureRequirement, FeatureSet, FeatureStatus};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    statuses: Vec<(u8, bool, String)>,
    requirements: Vec<(u8, Option<bool>, Option<String>)>,
}

fn slot(index: u8) -> usize {
    index as usize % Feature::ALL.len()
}

fn feature(index: u8) -> Feature {
    Feature::ALL[slot(index)]
}

fuzz_target!(|input: Input| {
    let mut table: [(bool, &str); 4] = [(false, ""); 4];
    for (f, enabled, mode) in &input.statuses {
        table[slot(*f)] = (*enabled, mode.as_str());
    }
    let expected = input.requirements.iter().all(|(f, enabled, mode)| {
        let (found_enabled, found_mode) = table[slot(*f)];
        enabled.map_or(true, |want| want == found_enabled)
            && mode.as_deref().map_or(true, |want| want == found_mode)
    });

    let set: FeatureSet = input
        .statuses
        .iter()
        .map(|(f, enabled, mode)| {
            (
                feature(*f),
                FeatureStatus {
                    enabled: *enabled,
                    mode: mode.clone(),
                },
            )
        })
        .collect();

    let requirements: Vec<FeatureRequirement> = input
        .requirements
        .iter()
        .map(|(f, enabled, mode)| {
            let mut req = FeatureRequirement::new(feature(*f));
            if let Some(enabled) = enabled {
                req = req.with_enabled(*enabled);
            }
            if let Some(mode) = mode {
                req = req.with_mode(mode.clone());
            }
            req
        })
        .collect();

    assert_eq!(set.matches_requirements(&requirements), expected);
});
