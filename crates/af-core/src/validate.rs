//! Cross-agent consistency checks.
//!
//! Each agent probed after the first is compared against the run baseline.
//! Differences are reported as [`Divergence`] warnings through a
//! [`DiagnosticSink`]; they never fail the run.

use af_common::{Feature, FeatureSet, FeatureStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::warn;

/// One disagreement between an agent and the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// The agent reports a feature the baseline does not have.
    NotInBaseline { feature: Feature, agent: String },
    /// Both report the feature, with different statuses.
    StatusMismatch {
        feature: Feature,
        agent: String,
        expected: FeatureStatus,
        found: FeatureStatus,
    },
    /// The baseline has a feature the agent does not report.
    NotInAgent { feature: Feature, agent: String },
}

impl Divergence {
    pub fn feature(&self) -> Feature {
        match self {
            Divergence::NotInBaseline { feature, .. }
            | Divergence::StatusMismatch { feature, .. }
            | Divergence::NotInAgent { feature, .. } => *feature,
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            Divergence::NotInBaseline { agent, .. }
            | Divergence::StatusMismatch { agent, .. }
            | Divergence::NotInAgent { agent, .. } => agent,
        }
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Divergence::NotInBaseline { .. } => "not_in_baseline",
            Divergence::StatusMismatch { .. } => "status_mismatch",
            Divergence::NotInAgent { .. } => "not_in_agent",
        }
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::NotInBaseline { feature, agent } => write!(
                f,
                "feature {:?} found in agent {}, but not in baseline",
                feature.as_str(),
                agent
            ),
            Divergence::StatusMismatch {
                feature,
                agent,
                expected,
                found,
            } => write!(
                f,
                "feature {:?} differs in agent {}. Expected {:?}, found {:?}",
                feature.as_str(),
                agent,
                expected.render(),
                found.render()
            ),
            Divergence::NotInAgent { feature, agent } => write!(
                f,
                "feature {:?} not found in agent {}",
                feature.as_str(),
                agent
            ),
        }
    }
}

/// Fire-and-forget destination for divergence warnings.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, divergence: &Divergence);
}

/// Emits each divergence as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, divergence: &Divergence) {
        warn!(
            feature = %divergence.feature(),
            agent = divergence.agent(),
            kind = divergence.kind(),
            "{}",
            divergence
        );
    }
}

/// Keeps every divergence in memory, for callers that want to inspect them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    warnings: Mutex<Vec<Divergence>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn warnings(&self) -> Vec<Divergence> {
        match self.warnings.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.warnings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for RecordingSink {
    fn warn(&self, divergence: &Divergence) {
        match self.warnings.lock() {
            Ok(mut guard) => guard.push(divergence.clone()),
            Err(poisoned) => poisoned.into_inner().push(divergence.clone()),
        }
    }
}

/// Compare `probed` against `baseline` without emitting anything.
///
/// Features the agent reports are checked first, then features it lacks.
pub fn find_divergences(baseline: &FeatureSet, probed: &FeatureSet, agent: &str) -> Vec<Divergence> {
    let mut found = Vec::new();

    for (feature, status) in probed {
        match baseline.get(*feature) {
            None => found.push(Divergence::NotInBaseline {
                feature: *feature,
                agent: agent.to_string(),
            }),
            Some(expected) if expected != status => found.push(Divergence::StatusMismatch {
                feature: *feature,
                agent: agent.to_string(),
                expected: expected.clone(),
                found: status.clone(),
            }),
            Some(_) => {}
        }
    }

    for (feature, _) in baseline {
        if !probed.contains(*feature) {
            found.push(Divergence::NotInAgent {
                feature: *feature,
                agent: agent.to_string(),
            });
        }
    }

    found
}

/// Report every difference between `probed` and `baseline` to `sink`.
///
/// Returns the divergences that were emitted.
pub fn validate_feature_set(
    baseline: &FeatureSet,
    probed: &FeatureSet,
    agent: &str,
    sink: &dyn DiagnosticSink,
) -> Vec<Divergence> {
    let divergences = find_divergences(baseline, probed, agent);
    for divergence in &divergences {
        sink.warn(divergence);
    }
    divergences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> FeatureSet {
        [
            (Feature::CniChaining, FeatureStatus::enabled("portmap")),
            (Feature::MonitorAggregation, FeatureStatus::enabled("medium")),
            (Feature::L7Proxy, FeatureStatus::enabled("")),
            (Feature::HostFirewall, FeatureStatus::enabled("")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_identical_sets_emit_nothing() {
        let sink = RecordingSink::new();
        let out = validate_feature_set(&baseline(), &baseline(), "ns/b", &sink);
        assert!(out.is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_mode_difference_emits_one_mismatch() {
        let mut probed = baseline();
        probed.insert(Feature::MonitorAggregation, FeatureStatus::enabled("maximum"));

        let sink = RecordingSink::new();
        validate_feature_set(&baseline(), &probed, "ns/b", &sink);
        let warnings = sink.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0],
            Divergence::StatusMismatch {
                feature: Feature::MonitorAggregation,
                agent: "ns/b".to_string(),
                expected: FeatureStatus::enabled("medium"),
                found: FeatureStatus::enabled("maximum"),
            }
        );
        assert_eq!(
            warnings[0].to_string(),
            "feature \"monitor-aggregation\" differs in agent ns/b. Expected \"Enabled:medium\", found \"Enabled:maximum\""
        );
    }

    #[test]
    fn test_missing_feature_emits_one_not_found() {
        let probed: FeatureSet = baseline()
            .iter()
            .filter(|(f, _)| **f != Feature::L7Proxy)
            .map(|(f, s)| (*f, s.clone()))
            .collect();

        let out = find_divergences(&baseline(), &probed, "ns/b");
        assert_eq!(
            out,
            vec![Divergence::NotInAgent {
                feature: Feature::L7Proxy,
                agent: "ns/b".to_string()
            }]
        );
        assert_eq!(out[0].to_string(), "feature \"l7-proxy\" not found in agent ns/b");
    }

    #[test]
    fn test_extra_feature_is_reported() {
        let mut base = baseline();
        base.insert(Feature::HostFirewall, FeatureStatus::disabled());
        let partial: FeatureSet = [(Feature::L7Proxy, FeatureStatus::enabled(""))]
            .into_iter()
            .collect();

        let out = find_divergences(&partial, &base, "ns/c");
        let kinds: Vec<_> = out.iter().map(|d| (d.kind(), d.feature())).collect();
        assert_eq!(
            kinds,
            vec![
                ("not_in_baseline", Feature::CniChaining),
                ("not_in_baseline", Feature::MonitorAggregation),
                ("not_in_baseline", Feature::HostFirewall),
            ]
        );
        assert!(out[0].to_string().contains("but not in baseline"));
    }

    #[test]
    fn test_absent_is_not_defaulted() {
        let base: FeatureSet = [(Feature::HostFirewall, FeatureStatus::disabled())]
            .into_iter()
            .collect();
        let out = find_divergences(&base, &FeatureSet::new(), "ns/d");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), "not_in_agent");
    }

    #[test]
    fn test_divergence_serializes_with_kind_tag() {
        let d = Divergence::NotInAgent {
            feature: Feature::CniChaining,
            agent: "ns/e".to_string(),
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "not_in_agent");
        assert_eq!(json["feature"], "cni-chaining");
    }
}
