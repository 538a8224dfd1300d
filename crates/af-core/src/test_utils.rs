//! In-memory cluster fakes for tests.
//!
//! Enabled in this crate's own tests and, for integration tests and
//! downstream crates, through the `test-utils` feature.

use af_common::{AgentRef, Feature, FeatureSet, FeatureStatus};
use af_config::AgentSettings;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::cancel::CancelToken;
use crate::cluster::{agent_ref, AgentPod, ConfigMap, ConfigMapReader, PodExecutor};
use crate::error::ClusterError;
use crate::logging::JsonlLayer;

const FAKE_CONFIG_MAP: &str = "cilium-config";

/// A failure the fake can be scripted to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFailure {
    NotFound,
    CommandFailed { code: i32, stderr: String },
    TimedOut,
    /// The transport noticed cancellation mid-call.
    Cancelled,
}

impl FakeFailure {
    fn into_error(self, kind: &str, namespace: &str, name: &str) -> ClusterError {
        match self {
            FakeFailure::NotFound => ClusterError::NotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            FakeFailure::CommandFailed { code, stderr } => ClusterError::CommandFailed { code, stderr },
            FakeFailure::TimedOut => ClusterError::TimedOut,
            FakeFailure::Cancelled => ClusterError::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
enum ExecScript {
    Output(Vec<u8>),
    Fail(FakeFailure),
}

#[derive(Debug, Default)]
struct FakeState {
    agents: Vec<AgentRef>,
    exec: BTreeMap<String, ExecScript>,
    config_maps: BTreeMap<(String, String), Result<ConfigMap, FakeFailure>>,
    cancel_after_exec: BTreeMap<String, CancelToken>,
    exec_log: Vec<(String, Vec<String>)>,
    exec_targets: Vec<AgentRef>,
}

/// Scripted cluster serving ConfigMaps and exec output from memory.
///
/// Clones share state, so a test can keep a handle after passing pods to the
/// detector and inspect the calls made.
#[derive(Debug, Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
    calls: Arc<AtomicUsize>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    /// A cluster whose `kube-system/cilium-config` sets `monitor-aggregation: medium`.
    pub fn new() -> Self {
        let cluster = FakeCluster {
            state: Arc::new(Mutex::new(FakeState::default())),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        cluster.with_config_map(
            &AgentSettings::default().namespace,
            FAKE_CONFIG_MAP,
            ConfigMap::with_data([("monitor-aggregation", "medium")]),
        )
    }

    fn default_agent(pod: &str) -> AgentRef {
        agent_ref(&AgentSettings::default(), pod)
    }

    /// Status document reporting every status-derived feature as enabled.
    pub fn full_status_json() -> String {
        r#"{
            "cniChaining": {"mode": "portmap"},
            "proxy": {"ip": "10.0.0.1", "port-range": "10000-20000"},
            "hostFirewall": {"mode": "Enabled"},
            "kvstore": {"state": "Disabled"}
        }"#
        .to_string()
    }

    /// Status document with host firewall turned off.
    pub fn host_firewall_disabled_json() -> String {
        Self::full_status_json().replace(r#""mode": "Enabled""#, r#""mode": "Disabled""#)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add an agent pod, placed per the default `[agent]` settings, answering
    /// the status command with `status`.
    pub fn with_agent(self, pod: &str, status: impl Into<String>) -> Self {
        self.with_agent_ref(Self::default_agent(pod), status)
    }

    pub fn with_agent_in(self, namespace: &str, pod: &str, status: impl Into<String>) -> Self {
        let agent = AgentRef {
            namespace: namespace.to_string(),
            ..Self::default_agent(pod)
        };
        self.with_agent_ref(agent, status)
    }

    pub fn with_agent_ref(self, agent: AgentRef, status: impl Into<String>) -> Self {
        {
            let mut state = self.lock();
            state
                .exec
                .insert(agent.name(), ExecScript::Output(status.into().into_bytes()));
            state.agents.push(agent);
        }
        self
    }

    /// Add an agent pod whose status command fails.
    pub fn with_failing_agent(self, pod: &str, failure: FakeFailure) -> Self {
        let agent = Self::default_agent(pod);
        {
            let mut state = self.lock();
            state.exec.insert(agent.name(), ExecScript::Fail(failure));
            state.agents.push(agent);
        }
        self
    }

    pub fn with_config_map(self, namespace: &str, name: &str, cm: ConfigMap) -> Self {
        self.lock()
            .config_maps
            .insert((namespace.to_string(), name.to_string()), Ok(cm));
        self
    }

    pub fn with_config_map_failure(self, namespace: &str, name: &str, failure: FakeFailure) -> Self {
        self.lock()
            .config_maps
            .insert((namespace.to_string(), name.to_string()), Err(failure));
        self
    }

    /// Fire `token` once the status command for `pod` has returned.
    pub fn cancel_after_exec(self, pod: &str, token: &CancelToken) -> Self {
        let name = Self::default_agent(pod).name();
        self.lock().cancel_after_exec.insert(name, token.clone());
        self
    }

    /// Every registered agent, in registration order, each reached through this fake.
    pub fn pods(&self) -> Vec<AgentPod> {
        let agents = self.lock().agents.clone();
        agents
            .into_iter()
            .map(|agent| AgentPod::new(agent, Arc::new(self.clone())))
            .collect()
    }

    /// Total ConfigMap reads and exec calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(agent, command)` for each exec call, in call order.
    pub fn exec_log(&self) -> Vec<(String, Vec<String>)> {
        self.lock().exec_log.clone()
    }

    /// Full identity (including container) of each exec target, in call order.
    pub fn exec_targets(&self) -> Vec<AgentRef> {
        self.lock().exec_targets.clone()
    }
}

impl ConfigMapReader for FakeCluster {
    fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<ConfigMap, ClusterError> {
        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (namespace.to_string(), name.to_string());
        match self.lock().config_maps.get(&key).cloned() {
            Some(Ok(cm)) => Ok(cm),
            Some(Err(failure)) => Err(failure.into_error("configmap", namespace, name)),
            None => Err(FakeFailure::NotFound.into_error("configmap", namespace, name)),
        }
    }
}

impl PodExecutor for FakeCluster {
    fn exec_in_pod(
        &self,
        agent: &AgentRef,
        command: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, ClusterError> {
        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = agent.name();
        let (script, trigger) = {
            let mut state = self.lock();
            state.exec_log.push((name.clone(), command.to_vec()));
            state.exec_targets.push(agent.clone());
            (
                state.exec.get(&name).cloned(),
                state.cancel_after_exec.get(&name).cloned(),
            )
        };
        let result = match script {
            Some(ExecScript::Output(bytes)) => Ok(bytes),
            Some(ExecScript::Fail(failure)) => Err(failure.into_error("pod", &agent.namespace, &agent.pod)),
            None => Err(FakeFailure::NotFound.into_error("pod", &agent.namespace, &agent.pod)),
        };
        if let Some(token) = trigger {
            token.cancel();
        }
        result
    }
}

/// Features produced by [`FakeCluster::full_status_json`] plus the default ConfigMap.
pub fn baseline_features() -> FeatureSet {
    [
        (Feature::CniChaining, FeatureStatus::enabled("portmap")),
        (Feature::MonitorAggregation, FeatureStatus::enabled("medium")),
        (Feature::L7Proxy, FeatureStatus::enabled("")),
        (Feature::HostFirewall, FeatureStatus::enabled("")),
    ]
    .into_iter()
    .collect()
}

/// In-memory writer shared between a [`JsonlLayer`] and the test reading it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut bytes) => io::Write::write(&mut *bytes, buf),
            Err(poisoned) => io::Write::write(&mut *poisoned.into_inner(), buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` under a JSONL subscriber filtered by `directives` and return the
/// parsed lines it wrote.
///
/// Panics if a line is not valid JSON.
pub fn capture_jsonl<F: FnOnce()>(directives: &str, f: F) -> Vec<serde_json::Value> {
    let buffer = SharedBuffer::default();
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(directives))
        .with(JsonlLayer::new(buffer.clone()));
    tracing::subscriber::with_default(subscriber, f);

    buffer
        .contents()
        .lines()
        .map(|line| match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => panic!("invalid JSON line {:?}: {}", line, err),
        })
        .collect()
}
