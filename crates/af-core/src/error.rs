//! Error types for feature detection.
//!
//! Three layers, innermost first:
//! - [`ClusterError`]: a collaborator (config accessor, pod exec) failed
//! - [`ExtractError`]: an extraction step failed, with source/agent context
//! - [`DetectionError`]: the detection pass was aborted
//!
//! Divergence between agents is never an error; see [`crate::validate`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::kubectl::ToolError;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Reading the agent configuration object.
    ConfigSource,
    /// Running the diagnostic command on an agent.
    RemoteExec,
    /// Decoding the diagnostic command's output.
    StatusParse,
    /// Run lifecycle (cancellation, empty input, reuse).
    Run,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::ConfigSource => write!(f, "config_source"),
            ErrorCategory::RemoteExec => write!(f, "remote_exec"),
            ErrorCategory::StatusParse => write!(f, "status_parse"),
            ErrorCategory::Run => write!(f, "run"),
        }
    }
}

/// Failures reported by cluster collaborators.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("command timed out")]
    TimedOut,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Failures of a single extraction step.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unable to retrieve ConfigMap {namespace}/{name}: {source}")]
    ConfigSourceUnavailable {
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("ConfigMap {namespace}/{name} does not contain any configuration")]
    ConfigSourceEmpty { namespace: String, name: String },

    #[error("failed to fetch agent status from {agent}: {source}")]
    RemoteExecFailed {
        agent: String,
        #[source]
        source: ClusterError,
    },

    #[error("unable to decode agent status from {agent}: {source}")]
    StatusParseFailed {
        agent: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExtractError {
    /// Stable error code.
    ///
    /// - 10-19: configuration source errors
    /// - 20-29: remote execution errors
    /// - 30-39: status decoding errors
    pub fn code(&self) -> u32 {
        match self {
            ExtractError::ConfigSourceUnavailable { .. } => 10,
            ExtractError::ConfigSourceEmpty { .. } => 11,
            ExtractError::RemoteExecFailed { .. } => 20,
            ExtractError::StatusParseFailed { .. } => 30,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ExtractError::ConfigSourceUnavailable { .. } | ExtractError::ConfigSourceEmpty { .. } => {
                ErrorCategory::ConfigSource
            }
            ExtractError::RemoteExecFailed { .. } => ErrorCategory::RemoteExec,
            ExtractError::StatusParseFailed { .. } => ErrorCategory::StatusParse,
        }
    }

    /// True when the collaborator gave up because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ExtractError::ConfigSourceUnavailable {
                source: ClusterError::Cancelled,
                ..
            } | ExtractError::RemoteExecFailed {
                source: ClusterError::Cancelled,
                ..
            }
        )
    }
}

/// Which extraction step was running when a pass aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStep {
    ConfigMap,
    AgentStatus,
}

impl fmt::Display for ExtractionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStep::ConfigMap => write!(f, "ConfigMap extraction"),
            ExtractionStep::AgentStatus => write!(f, "agent status extraction"),
        }
    }
}

/// Why a detection pass aborted.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("agent {agent}: {step} failed: {source}")]
    Extraction {
        agent: String,
        step: ExtractionStep,
        #[source]
        source: ExtractError,
    },

    #[error("detection cancelled before {step} on agent {agent}")]
    Cancelled { agent: String, step: ExtractionStep },

    #[error("no agents to probe")]
    NoAgents,

    #[error("feature baseline already established for run {run_id}")]
    BaselineAlreadyEstablished { run_id: String },
}

impl DetectionError {
    /// Stable error code; extraction failures reuse [`ExtractError::code`].
    pub fn code(&self) -> u32 {
        match self {
            DetectionError::Extraction { source, .. } => source.code(),
            DetectionError::Cancelled { .. } => 40,
            DetectionError::NoAgents => 41,
            DetectionError::BaselineAlreadyEstablished { .. } => 42,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DetectionError::Extraction { source, .. } => source.category(),
            _ => ErrorCategory::Run,
        }
    }

    /// Agent being probed when the pass aborted, if any.
    pub fn agent(&self) -> Option<&str> {
        match self {
            DetectionError::Extraction { agent, .. } | DetectionError::Cancelled { agent, .. } => {
                Some(agent)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_context_in_message() {
        let err = DetectionError::Extraction {
            agent: "kube-system/cilium-a".to_string(),
            step: ExtractionStep::ConfigMap,
            source: ExtractError::ConfigSourceEmpty {
                namespace: "kube-system".to_string(),
                name: "cilium-config".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("kube-system/cilium-a"));
        assert!(msg.contains("ConfigMap extraction"));
        assert!(msg.contains("kube-system/cilium-config"));
        assert_eq!(err.code(), 11);
        assert_eq!(err.category(), ErrorCategory::ConfigSource);
        assert_eq!(err.agent(), Some("kube-system/cilium-a"));
    }

    #[test]
    fn test_run_errors() {
        assert_eq!(DetectionError::NoAgents.code(), 41);
        assert_eq!(DetectionError::NoAgents.category(), ErrorCategory::Run);
        assert_eq!(DetectionError::NoAgents.agent(), None);
    }

    #[test]
    fn test_source_chain_preserved() {
        use std::error::Error as _;
        let err = ExtractError::RemoteExecFailed {
            agent: "ns/pod".to_string(),
            source: ClusterError::CommandFailed {
                code: 1,
                stderr: "container not found".to_string(),
            },
        };
        let source = err.source().expect("has source");
        assert!(source.to_string().contains("container not found"));
        assert_eq!(err.category(), ErrorCategory::RemoteExec);
    }

    #[test]
    fn test_transport_cancellation_detected() {
        let cancelled = ExtractError::RemoteExecFailed {
            agent: "ns/pod".to_string(),
            source: ClusterError::Cancelled,
        };
        assert!(cancelled.is_cancelled());

        let cancelled = ExtractError::ConfigSourceUnavailable {
            namespace: "ns".to_string(),
            name: "cilium-config".to_string(),
            source: ClusterError::Cancelled,
        };
        assert!(cancelled.is_cancelled());

        let failed = ExtractError::RemoteExecFailed {
            agent: "ns/pod".to_string(),
            source: ClusterError::TimedOut,
        };
        assert!(!failed.is_cancelled());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::StatusParse.to_string(), "status_parse");
        assert_eq!(ExtractionStep::AgentStatus.to_string(), "agent status extraction");
    }
}
