//! Feature catalog, statuses, sets, and requirements.
//!
//! A [`FeatureSet`] holds what one agent reports. Requirement matching reads
//! absent features as `{enabled: false, mode: ""}`; consistency checks treat
//! absence as a discrepancy of its own.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An optional capability of the network fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// The agent runs chained behind another CNI plugin.
    CniChaining,
    /// Level of monitor event aggregation.
    MonitorAggregation,
    /// The L7 proxy is running.
    L7Proxy,
    /// Host firewall enforcement.
    HostFirewall,
}

impl Feature {
    /// Every feature in the catalog.
    pub const ALL: [Feature; 4] = [
        Feature::CniChaining,
        Feature::MonitorAggregation,
        Feature::L7Proxy,
        Feature::HostFirewall,
    ];

    /// Stable kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::CniChaining => "cni-chaining",
            Feature::MonitorAggregation => "monitor-aggregation",
            Feature::L7Proxy => "l7-proxy",
            Feature::HostFirewall => "host-firewall",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name outside the feature catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feature: {0}")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// Status of a single feature.
///
/// Some features are simply on or off. Others carry a mode string with more
/// detail, e.g. the name of the chained CNI or the monitor aggregation level.
/// Equality is exact on both fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub enabled: bool,
    #[serde(default)]
    pub mode: String,
}

impl FeatureStatus {
    /// An enabled status with the given mode (may be empty).
    pub fn enabled(mode: impl Into<String>) -> Self {
        FeatureStatus {
            enabled: true,
            mode: mode.into(),
        }
    }

    /// A disabled status with no mode.
    pub fn disabled() -> Self {
        FeatureStatus::default()
    }

    /// Render as `Enabled`/`Disabled`, suffixed with `:mode` when a mode is set.
    pub fn render(&self) -> String {
        let state = if self.enabled { "Enabled" } else { "Disabled" };
        if self.mode.is_empty() {
            state.to_string()
        } else {
            format!("{}:{}", state, self.mode)
        }
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Status of every detected feature, keyed by feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeMap<Feature, FeatureStatus>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status, returning the previous one for that feature.
    pub fn insert(&mut self, feature: Feature, status: FeatureStatus) -> Option<FeatureStatus> {
        self.0.insert(feature, status)
    }

    pub fn get(&self, feature: Feature) -> Option<&FeatureStatus> {
        self.0.get(&feature)
    }

    /// Status for `feature`, defaulting to disabled with an empty mode.
    pub fn status(&self, feature: Feature) -> FeatureStatus {
        self.0.get(&feature).cloned().unwrap_or_default()
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains_key(&feature)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Feature, FeatureStatus> {
        self.0.iter()
    }

    /// Copy every entry of `other` into this set, overwriting on collision.
    pub fn merge(&mut self, other: FeatureSet) {
        self.0.extend(other.0);
    }

    /// True iff every requirement holds. An empty list is vacuously true.
    pub fn matches_requirements(&self, requirements: &[FeatureRequirement]) -> bool {
        requirements.iter().all(|req| req.is_satisfied_by(self))
    }
}

impl FromIterator<(Feature, FeatureStatus)> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = (Feature, FeatureStatus)>>(iter: I) -> Self {
        FeatureSet(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = (&'a Feature, &'a FeatureStatus);
    type IntoIter = btree_map::Iter<'a, Feature, FeatureStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A test precondition over one feature.
///
/// Each sub-predicate is independent: a mode requirement never implies an
/// enabled requirement, and vice versa. Inactive sub-predicates always hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureRequirement {
    feature: Feature,
    enabled: Option<bool>,
    mode: Option<String>,
}

impl FeatureRequirement {
    /// A requirement with no active sub-predicate.
    pub fn new(feature: Feature) -> Self {
        FeatureRequirement {
            feature,
            enabled: None,
            mode: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn required_enabled(&self) -> Option<bool> {
        self.enabled
    }

    pub fn required_mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn is_satisfied_by(&self, set: &FeatureSet) -> bool {
        let status = set.get(self.feature);
        let enabled = status.map(|s| s.enabled).unwrap_or(false);
        let mode = status.map(|s| s.mode.as_str()).unwrap_or("");

        if let Some(want) = self.enabled {
            if want != enabled {
                return false;
            }
        }
        if let Some(want) = self.mode.as_deref() {
            if want != mode {
                return false;
            }
        }
        true
    }
}

/// Requirement that `feature` is enabled.
pub fn require_feature_enabled(feature: Feature) -> FeatureRequirement {
    FeatureRequirement::new(feature).with_enabled(true)
}

/// Requirement that `feature` runs in `mode`. Does not check enablement.
pub fn require_feature_mode(feature: Feature, mode: impl Into<String>) -> FeatureRequirement {
    FeatureRequirement::new(feature).with_mode(mode)
}
