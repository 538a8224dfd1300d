//! Agent feature detection configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `agent-features.toml`
//! - Config resolution (explicit path → env → XDG → system → defaults)
//! - Semantic validation of names, commands, and limits

pub mod detection;
pub mod resolve;
pub mod validate;

pub use detection::{AgentSettings, ConfigMapSettings, DetectionConfig, KubectlSettings};
pub use resolve::{load_config, resolve_config_path, ConfigSource, LoadedConfig};
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Default namespace the agents run in.
pub const DEFAULT_AGENT_NAMESPACE: &str = "kube-system";

/// Default agent container to exec into.
pub const DEFAULT_AGENT_CONTAINER: &str = "cilium-agent";

/// Default name of the agent configuration ConfigMap.
pub const DEFAULT_CONFIG_MAP_NAME: &str = "cilium-config";
