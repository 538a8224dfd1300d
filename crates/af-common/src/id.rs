//! Agent pod identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one agent: the pod it runs in and the container to exec into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentRef {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl AgentRef {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        AgentRef {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }

    /// `namespace/pod`, the label used in diagnostics.
    pub fn name(&self) -> String {
        format!("{}/{}", self.namespace, self.pod)
    }
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod)
    }
}
