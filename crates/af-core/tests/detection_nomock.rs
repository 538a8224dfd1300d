//! No-mock detection pipeline tests.
//!
//! Drives `RunContext::detect_features` end to end against the in-memory
//! `FakeCluster` and covers:
//! - Baseline establishment and cross-agent warnings
//! - Abort-on-first-error with agent and step context
//! - Cancellation between agents
//! - Agent placement, ConfigMap namespace and status command taken from configuration

use af_common::{
    require_feature_enabled, require_feature_mode, AgentRef, Feature, FeatureSet, FeatureStatus,
};
use af_config::DetectionConfig;
use af_core::test_utils::{baseline_features, FakeCluster, FakeFailure};
use af_core::{
    AgentStatus, CancelToken, ConfigMap, DetectionError, Divergence, ErrorCategory, ExtractError,
    ExtractionStep, RecordingSink, RunContext,
};
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn context(sink: &Arc<RecordingSink>) -> RunContext {
    RunContext::with_sink(DetectionConfig::default(), sink.clone())
}

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read(&path).expect("read fixture")
}

// ============================================================================
// Baseline and divergence
// ============================================================================

#[test]
fn two_agents_differing_in_host_firewall_warn_once() {
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_agent("cilium-b", FakeCluster::host_firewall_disabled_json());
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(&sink);

    let summary = ctx
        .detect_features(&cluster.pods(), &CancelToken::new())
        .expect("detection succeeds");

    let warnings = sink.warnings();
    assert_eq!(warnings.len(), 1, "warnings: {:?}", warnings);
    assert_eq!(
        warnings[0],
        Divergence::StatusMismatch {
            feature: Feature::HostFirewall,
            agent: "kube-system/cilium-b".to_string(),
            expected: FeatureStatus::enabled(""),
            found: FeatureStatus::disabled(),
        }
    );
    let message = warnings[0].to_string();
    assert!(message.contains("kube-system/cilium-b"));
    assert!(message.contains("Expected \"Enabled\", found \"Disabled\""));

    assert_eq!(summary.divergences, warnings);
    assert!(!summary.is_consistent());
    assert_eq!(
        summary.agents,
        vec!["kube-system/cilium-a".to_string(), "kube-system/cilium-b".to_string()]
    );
    assert_eq!(summary.baseline, baseline_features());
    assert_eq!(ctx.features(), Some(&baseline_features()));
}

#[test]
fn consistent_agents_emit_nothing() {
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_agent("cilium-b", FakeCluster::full_status_json())
        .with_agent("cilium-c", FakeCluster::full_status_json());
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(&sink);

    let summary = ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap();
    assert!(summary.is_consistent());
    assert!(sink.is_empty());
    assert_eq!(summary.agents.len(), 3);
    // one ConfigMap read and one exec per agent
    assert_eq!(cluster.calls(), 6);
}

#[test]
fn first_agent_wins_even_when_it_is_the_outlier() {
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::host_firewall_disabled_json())
        .with_agent("cilium-b", FakeCluster::full_status_json())
        .with_agent("cilium-c", FakeCluster::full_status_json());
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(&sink);

    let summary = ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap();
    assert_eq!(
        summary.baseline.status(Feature::HostFirewall),
        FeatureStatus::disabled()
    );
    let agents: Vec<_> = sink.warnings().iter().map(|d| d.agent().to_string()).collect();
    assert_eq!(agents, ["kube-system/cilium-b", "kube-system/cilium-c"]);
}

#[test]
fn monitor_aggregation_differs_across_namespaces() {
    let cluster = FakeCluster::new()
        .with_config_map(
            "cilium",
            "cilium-config",
            ConfigMap::with_data([("monitor-aggregation", "Maximum")]),
        )
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_agent_in("cilium", "cilium-b", FakeCluster::full_status_json());
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(&sink);

    ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap();
    let warnings = sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].feature(), Feature::MonitorAggregation);
    assert_eq!(
        warnings[0].to_string(),
        "feature \"monitor-aggregation\" differs in agent cilium/cilium-b. Expected \"Enabled:medium\", found \"Enabled:maximum\""
    );
}

#[test]
fn configured_config_map_namespace_overrides_agent_namespace() {
    let cluster = FakeCluster::new().with_agent_in("cilium", "cilium-a", FakeCluster::full_status_json());
    let mut config = DetectionConfig::default();
    config.config_map.namespace = Some("kube-system".to_string());
    let ctx = RunContext::with_sink(config, Arc::new(RecordingSink::new()));

    let summary = ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap();
    assert_eq!(
        summary.baseline.status(Feature::MonitorAggregation),
        FeatureStatus::enabled("medium")
    );
}

#[test]
fn configured_status_command_is_sent() {
    let cluster = FakeCluster::new().with_agent("cilium-a", FakeCluster::full_status_json());
    let mut config = DetectionConfig::default();
    config.agent.status_command = vec!["cilium-dbg".into(), "status".into(), "-o".into(), "json".into()];
    let ctx = RunContext::with_sink(config, Arc::new(RecordingSink::new()));

    ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap();
    let log = cluster.exec_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, "kube-system/cilium-a");
    assert_eq!(log[0].1, ["cilium-dbg", "status", "-o", "json"]);
}

#[test]
fn configured_agent_namespace_and_container_reach_the_cluster() {
    let cluster = FakeCluster::new()
        .with_config_map("cilium", "cilium-config", ConfigMap::with_data([("monitor-aggregation", "low")]))
        .with_agent_ref(AgentRef::new("cilium", "cilium-a", "agent"), FakeCluster::full_status_json());
    let mut config = DetectionConfig::default();
    config.agent.namespace = "cilium".to_string();
    config.agent.container = "agent".to_string();
    let ctx = RunContext::with_sink(config, Arc::new(RecordingSink::new()));

    let pods = ctx.agent_pods(["cilium-a"], Arc::new(cluster.clone()));
    let summary = ctx.detect_features(&pods, &CancelToken::new()).unwrap();

    assert_eq!(summary.agents, ["cilium/cilium-a"]);
    assert_eq!(
        summary.baseline.status(Feature::MonitorAggregation),
        FeatureStatus::enabled("low")
    );
    assert_eq!(cluster.exec_targets(), [AgentRef::new("cilium", "cilium-a", "agent")]);
}

// ============================================================================
// Failures abort the pass
// ============================================================================

#[test]
fn missing_config_map_aborts_with_context() {
    let cluster = FakeCluster::new()
        .with_config_map_failure("kube-system", "cilium-config", FakeFailure::NotFound)
        .with_agent("cilium-a", FakeCluster::full_status_json());
    let ctx = context(&Arc::new(RecordingSink::new()));

    let err = ctx
        .detect_features(&cluster.pods(), &CancelToken::new())
        .unwrap_err();
    match &err {
        DetectionError::Extraction {
            agent,
            step,
            source: ExtractError::ConfigSourceUnavailable { namespace, name, .. },
        } => {
            assert_eq!(agent, "kube-system/cilium-a");
            assert_eq!(*step, ExtractionStep::ConfigMap);
            assert_eq!(namespace, "kube-system");
            assert_eq!(name, "cilium-config");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.code(), 10);
    assert_eq!(err.category(), ErrorCategory::ConfigSource);
    assert!(ctx.features().is_none());
    // status is never fetched once the ConfigMap step fails
    assert!(cluster.exec_log().is_empty());
}

#[test]
fn config_map_without_data_aborts() {
    let cluster = FakeCluster::new()
        .with_config_map("kube-system", "cilium-config", ConfigMap { data: None })
        .with_agent("cilium-a", FakeCluster::full_status_json());
    let ctx = context(&Arc::new(RecordingSink::new()));

    let err = ctx
        .detect_features(&cluster.pods(), &CancelToken::new())
        .unwrap_err();
    assert_eq!(err.code(), 11);
    assert!(err.to_string().contains("does not contain any configuration"));
}

#[test]
fn later_agent_failure_leaves_baseline_unset() {
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_failing_agent(
            "cilium-b",
            FakeFailure::CommandFailed {
                code: 1,
                stderr: "container cilium-agent is not valid".to_string(),
            },
        )
        .with_agent("cilium-c", FakeCluster::full_status_json());
    let sink = Arc::new(RecordingSink::new());
    let ctx = context(&sink);

    let err = ctx
        .detect_features(&cluster.pods(), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(
        err,
        DetectionError::Extraction {
            step: ExtractionStep::AgentStatus,
            source: ExtractError::RemoteExecFailed { .. },
            ..
        }
    ));
    assert_eq!(err.agent(), Some("kube-system/cilium-b"));
    assert!(err.to_string().contains("container cilium-agent is not valid"));
    assert!(ctx.features().is_none());
    assert!(!ctx.matches_requirements(&[require_feature_enabled(Feature::L7Proxy)]));

    let probed: Vec<_> = cluster.exec_log().into_iter().map(|(agent, _)| agent).collect();
    assert_eq!(probed, ["kube-system/cilium-a", "kube-system/cilium-b"]);
}

#[test]
fn garbage_status_output_aborts() {
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_agent("cilium-b", "Error: cannot connect to agent socket");
    let ctx = context(&Arc::new(RecordingSink::new()));

    let err = ctx
        .detect_features(&cluster.pods(), &CancelToken::new())
        .unwrap_err();
    assert_eq!(err.code(), 30);
    assert_eq!(err.category(), ErrorCategory::StatusParse);
    assert_eq!(err.agent(), Some("kube-system/cilium-b"));
}

#[test]
fn cancellation_between_agents() {
    let cancel = CancelToken::new();
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_agent("cilium-b", FakeCluster::full_status_json())
        .cancel_after_exec("cilium-a", &cancel);
    let ctx = context(&Arc::new(RecordingSink::new()));

    let err = ctx.detect_features(&cluster.pods(), &cancel).unwrap_err();
    match err {
        DetectionError::Cancelled { agent, step } => {
            assert_eq!(agent, "kube-system/cilium-b");
            assert_eq!(step, ExtractionStep::ConfigMap);
        }
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert!(ctx.features().is_none());
    assert_eq!(cluster.calls(), 2);
}

#[test]
fn cancellation_inside_transport_is_reported_as_cancelled() {
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_failing_agent("cilium-b", FakeFailure::Cancelled);
    let ctx = context(&Arc::new(RecordingSink::new()));

    let err = ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap_err();
    assert!(
        matches!(
            err,
            DetectionError::Cancelled {
                step: ExtractionStep::AgentStatus,
                ..
            }
        ),
        "got {:?}",
        err
    );
    assert_eq!(err.code(), 40);
    assert_eq!(err.category(), ErrorCategory::Run);
    assert_eq!(err.agent(), Some("kube-system/cilium-b"));
    assert!(ctx.features().is_none());
}

// ============================================================================
// Requirements and summary
// ============================================================================

#[test]
fn requirements_evaluated_against_baseline() {
    let cluster = FakeCluster::new().with_agent("cilium-a", FakeCluster::full_status_json());
    let ctx = context(&Arc::new(RecordingSink::new()));
    ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap();

    assert!(ctx.matches_requirements(&[]));
    assert!(ctx.matches_requirements(&[
        require_feature_enabled(Feature::L7Proxy),
        require_feature_mode(Feature::CniChaining, "portmap"),
        require_feature_mode(Feature::MonitorAggregation, "medium"),
    ]));
    assert!(!ctx.matches_requirements(&[require_feature_mode(Feature::CniChaining, "aws-cni")]));
    assert!(ctx.matches_requirements(&[require_feature_mode(Feature::HostFirewall, "")]));
}

#[test]
fn summary_serializes_to_json() {
    let cluster = FakeCluster::new()
        .with_agent("cilium-a", FakeCluster::full_status_json())
        .with_agent("cilium-b", FakeCluster::host_firewall_disabled_json());
    let ctx = context(&Arc::new(RecordingSink::new())).with_run_id("run-0123456789ab");
    let summary = ctx.detect_features(&cluster.pods(), &CancelToken::new()).unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["run_id"], "run-0123456789ab");
    assert_eq!(json["baseline"]["cni-chaining"]["mode"], "portmap");
    assert_eq!(json["baseline"]["host-firewall"]["enabled"], true);
    assert_eq!(json["divergences"][0]["kind"], "status_mismatch");
    assert_eq!(json["divergences"][0]["agent"], "kube-system/cilium-b");
}

#[test]
fn captured_status_document_decodes() {
    let status = AgentStatus::from_slice(&fixture("agent_status.json")).expect("decode fixture");
    let mut set = FeatureSet::new();
    status.record_features(&mut set);

    assert_eq!(set.status(Feature::CniChaining), FeatureStatus::enabled("aws-cni"));
    assert_eq!(set.status(Feature::L7Proxy), FeatureStatus::enabled(""));
    assert_eq!(set.status(Feature::HostFirewall), FeatureStatus::disabled());
}
