//! Detection orchestration and the run-scoped feature baseline.
//!
//! A [`RunContext`] lives for one test run. [`RunContext::detect_features`]
//! probes every agent in order: the first agent's features become the
//! baseline, every later agent is validated against it. Any extraction error
//! aborts the pass and leaves the baseline unset.

use af_common::{FeatureRequirement, FeatureSet};
use af_config::DetectionConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, info_span, warn};

use crate::cancel::CancelToken;
use crate::cluster::{AgentClient, AgentPod};
use crate::error::{DetectionError, ExtractError, ExtractionStep};
use crate::extract::{extract_features_from_agent_status, extract_features_from_config_map};
use crate::logging::generate_run_id;
use crate::validate::{validate_feature_set, DiagnosticSink, Divergence, TracingSink};

/// Outcome of a successful detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub run_id: String,
    /// Agents probed, in probe order. The first one supplied the baseline.
    pub agents: Vec<String>,
    pub baseline: FeatureSet,
    pub divergences: Vec<Divergence>,
}

impl DetectionSummary {
    /// True when every agent agreed with the baseline.
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// State owned by one test run.
pub struct RunContext {
    run_id: String,
    config: DetectionConfig,
    sink: Arc<dyn DiagnosticSink>,
    features: OnceLock<FeatureSet>,
}

impl RunContext {
    /// A context that reports divergences through `tracing`.
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: DetectionConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        RunContext {
            run_id: generate_run_id(),
            config,
            sink,
            features: OnceLock::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Pods named `pods`, placed per the `[agent]` settings and all reached
    /// through `client`.
    pub fn agent_pods<I>(&self, pods: I, client: Arc<dyn AgentClient>) -> Vec<AgentPod>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        pods.into_iter()
            .map(|pod| AgentPod::from_settings(&self.config.agent, pod, client.clone()))
            .collect()
    }

    /// The baseline, once a detection pass has succeeded.
    pub fn features(&self) -> Option<&FeatureSet> {
        self.features.get()
    }

    /// Evaluate test requirements against the baseline.
    ///
    /// Before detection has succeeded this behaves as an empty feature set.
    pub fn matches_requirements(&self, requirements: &[FeatureRequirement]) -> bool {
        match self.features.get() {
            Some(set) => set.matches_requirements(requirements),
            None => FeatureSet::new().matches_requirements(requirements),
        }
    }

    /// Probe `agents` in order and establish the baseline.
    pub fn detect_features(
        &self,
        agents: &[AgentPod],
        cancel: &CancelToken,
    ) -> Result<DetectionSummary, DetectionError> {
        if self.features.get().is_some() {
            return Err(DetectionError::BaselineAlreadyEstablished {
                run_id: self.run_id.clone(),
            });
        }
        if agents.is_empty() {
            return Err(DetectionError::NoAgents);
        }

        let span = info_span!("detect_features", run_id = %self.run_id, agents = agents.len());
        let _enter = span.enter();

        let mut baseline: Option<FeatureSet> = None;
        let mut divergences = Vec::new();
        let mut probed = Vec::with_capacity(agents.len());

        for pod in agents {
            let agent = pod.name();
            let _agent_span = info_span!("probe_agent", agent = %agent).entered();
            let features = self.probe_agent(pod, cancel)?;
            probed.push(agent.clone());

            match &baseline {
                None => {
                    info!(agent = %agent, features = features.len(), "feature baseline established");
                    baseline = Some(features);
                }
                Some(reference) => {
                    let found =
                        validate_feature_set(reference, &features, &agent, self.sink.as_ref());
                    debug!(agent = %agent, divergences = found.len(), "validated agent features");
                    divergences.extend(found);
                }
            }
        }

        let baseline = baseline.ok_or(DetectionError::NoAgents)?;
        if self.features.set(baseline.clone()).is_err() {
            return Err(DetectionError::BaselineAlreadyEstablished {
                run_id: self.run_id.clone(),
            });
        }

        info!(
            agents = probed.len(),
            divergences = divergences.len(),
            "feature detection complete"
        );

        Ok(DetectionSummary {
            run_id: self.run_id.clone(),
            agents: probed,
            baseline,
            divergences,
        })
    }

    /// Build one agent's feature set from both sources.
    fn probe_agent(&self, pod: &AgentPod, cancel: &CancelToken) -> Result<FeatureSet, DetectionError> {
        let agent = pod.name();
        let mut features = FeatureSet::new();

        let namespace = self.config.config_map.namespace_for(&pod.agent.namespace);
        run_step(&agent, ExtractionStep::ConfigMap, cancel, || {
            extract_features_from_config_map(
                pod.client.as_ref(),
                namespace,
                &self.config.config_map.name,
                cancel,
                &mut features,
            )
        })?;

        run_step(&agent, ExtractionStep::AgentStatus, cancel, || {
            extract_features_from_agent_status(
                pod.client.as_ref(),
                &pod.agent,
                &self.config.agent.status_command,
                cancel,
                &mut features,
            )
        })?;

        Ok(features)
    }
}

/// Run one extraction step inside its span.
///
/// A collaborator that stopped on cancellation surfaces as
/// [`DetectionError::Cancelled`], not as an extraction failure.
fn run_step<F>(
    agent: &str,
    step: ExtractionStep,
    cancel: &CancelToken,
    extract: F,
) -> Result<(), DetectionError>
where
    F: FnOnce() -> Result<(), ExtractError>,
{
    check_cancelled(cancel, agent, step)?;
    let _step_span = info_span!("extract", step = %step).entered();
    extract().map_err(|source| {
        if source.is_cancelled() {
            info!(error = %source, "extraction cancelled");
            DetectionError::Cancelled {
                agent: agent.to_string(),
                step,
            }
        } else {
            warn!(error = %source, code = source.code(), "extraction failed");
            DetectionError::Extraction {
                agent: agent.to_string(),
                step,
                source,
            }
        }
    })
}

fn check_cancelled(
    cancel: &CancelToken,
    agent: &str,
    step: ExtractionStep,
) -> Result<(), DetectionError> {
    if cancel.is_cancelled() {
        return Err(DetectionError::Cancelled {
            agent: agent.to_string(),
            step,
        });
    }
    Ok(())
}
