//! Typed detection configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! configuration that targets a stock agent deployment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::validate::{ValidationError, ValidationResult};
use crate::{DEFAULT_AGENT_CONTAINER, DEFAULT_AGENT_NAMESPACE, DEFAULT_CONFIG_MAP_NAME};

/// Default timeout for a single kubectl invocation.
pub const DEFAULT_KUBECTL_TIMEOUT_MS: u64 = 30_000;

/// Default cap on captured kubectl output (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Root of `agent-features.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    pub agent: AgentSettings,
    pub config_map: ConfigMapSettings,
    pub kubectl: KubectlSettings,
}

/// Where the agents run and how to ask them for status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub namespace: String,
    pub container: String,
    /// Diagnostic command run inside the agent container. Must print JSON.
    pub status_command: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            namespace: DEFAULT_AGENT_NAMESPACE.to_string(),
            container: DEFAULT_AGENT_CONTAINER.to_string(),
            status_command: vec![
                "cilium".to_string(),
                "status".to_string(),
                "-o".to_string(),
                "json".to_string(),
            ],
        }
    }
}

/// The cluster-wide agent ConfigMap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigMapSettings {
    pub name: String,
    /// Namespace of the ConfigMap. `None` reads it from each agent's own namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Default for ConfigMapSettings {
    fn default() -> Self {
        ConfigMapSettings {
            name: DEFAULT_CONFIG_MAP_NAME.to_string(),
            namespace: None,
        }
    }
}

impl ConfigMapSettings {
    /// Namespace to read the ConfigMap from for an agent in `agent_namespace`.
    pub fn namespace_for<'a>(&'a self, agent_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(agent_namespace)
    }
}

/// How to invoke kubectl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KubectlSettings {
    pub binary: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for KubectlSettings {
    fn default() -> Self {
        KubectlSettings {
            binary: PathBuf::from("kubectl"),
            context: None,
            kubeconfig: None,
            timeout_ms: DEFAULT_KUBECTL_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl DetectionConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> ValidationResult<Self> {
        toml::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> ValidationResult<String> {
        toml::to_string_pretty(self).map_err(|e| ValidationError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DetectionConfig::default();
        assert_eq!(config.agent.namespace, "kube-system");
        assert_eq!(config.agent.container, "cilium-agent");
        assert_eq!(config.agent.status_command, ["cilium", "status", "-o", "json"]);
        assert_eq!(config.config_map.name, "cilium-config");
        assert_eq!(config.config_map.namespace, None);
        assert_eq!(config.kubectl.binary, PathBuf::from("kubectl"));
        assert_eq!(config.kubectl.timeout_ms, 30_000);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = DetectionConfig::from_toml_str("").unwrap();
        assert_eq!(config, DetectionConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = DetectionConfig::from_toml_str(
            r#"
            [agent]
            namespace = "cilium"

            [kubectl]
            context = "kind-test"
            timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.namespace, "cilium");
        assert_eq!(config.agent.container, "cilium-agent");
        assert_eq!(config.kubectl.context.as_deref(), Some("kind-test"));
        assert_eq!(config.kubectl.timeout_ms, 5000);
        assert_eq!(config.kubectl.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = DetectionConfig::from_toml_str("[agent]\nnamespaces = \"x\"\n").unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn test_config_map_namespace_fallback() {
        let mut settings = ConfigMapSettings::default();
        assert_eq!(settings.namespace_for("kube-system"), "kube-system");
        settings.namespace = Some("cilium".to_string());
        assert_eq!(settings.namespace_for("kube-system"), "cilium");
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = DetectionConfig::default();
        config.kubectl.kubeconfig = Some(PathBuf::from("/tmp/kubeconfig"));
        let text = config.to_toml_string().unwrap();
        assert_eq!(DetectionConfig::from_toml_str(&text).unwrap(), config);
    }
}
