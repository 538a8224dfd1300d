//! Cluster collaborators: the config accessor and the pod exec transport.
//!
//! Detection only reads through these traits. Connecting to the cluster and
//! listing agent pods happen outside this crate; callers hand the detector a
//! list of [`AgentPod`]s, each carrying the client that can reach it.

use af_common::AgentRef;
use af_config::AgentSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::ClusterError;

/// The parts of a ConfigMap detection reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    /// `None` when the object carries no data payload at all.
    #[serde(default)]
    pub data: Option<BTreeMap<String, String>>,
}

impl ConfigMap {
    pub fn with_data<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ConfigMap {
            data: Some(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

/// Read-only lookup of a ConfigMap by namespace and name.
pub trait ConfigMapReader: Send + Sync {
    fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<ConfigMap, ClusterError>;
}

/// One-shot command execution inside an agent container.
pub trait PodExecutor: Send + Sync {
    /// Run `command` in `agent`'s container and return captured stdout.
    fn exec_in_pod(
        &self,
        agent: &AgentRef,
        command: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, ClusterError>;
}

/// A client that can both read ConfigMaps and exec into pods.
pub trait AgentClient: ConfigMapReader + PodExecutor {}

impl<T: ConfigMapReader + PodExecutor> AgentClient for T {}

/// An agent pod together with the client that reaches its cluster.
#[derive(Clone)]
pub struct AgentPod {
    pub agent: AgentRef,
    pub client: Arc<dyn AgentClient>,
}

impl AgentPod {
    pub fn new(agent: AgentRef, client: Arc<dyn AgentClient>) -> Self {
        AgentPod { agent, client }
    }

    /// A pod in the configured agent namespace, addressed through the
    /// configured container.
    pub fn from_settings(
        settings: &AgentSettings,
        pod: impl Into<String>,
        client: Arc<dyn AgentClient>,
    ) -> Self {
        AgentPod::new(agent_ref(settings, pod), client)
    }

    pub fn name(&self) -> String {
        self.agent.name()
    }
}

/// Identity of `pod` under the configured namespace and container.
pub fn agent_ref(settings: &AgentSettings, pod: impl Into<String>) -> AgentRef {
    AgentRef::new(settings.namespace.clone(), pod, settings.container.clone())
}

impl fmt::Debug for AgentPod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentPod")
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}
