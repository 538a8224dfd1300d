//! Configuration resolution and path discovery.
//!
//! Resolution order: explicit path → environment variables → XDG paths →
//! system config → defaults.

use std::path::{Path, PathBuf};

use crate::detection::DetectionConfig;
use crate::validate::{validate_config, ValidationError, ValidationResult};

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided by the caller.
    Explicit,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/agent-features/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit => write!(f, "explicit path"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "AGENT_FEATURES_CONFIG";
pub const ENV_CONFIG_DIR: &str = "AGENT_FEATURES_CONFIG_DIR";

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "agent-features.toml";

/// Application name for XDG directories.
const APP_NAME: &str = "agent-features";

/// A validated configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DetectionConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Resolve the configuration file path.
///
/// An explicit path is returned even if it does not exist, so that loading
/// reports the missing file instead of silently falling back to defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    // 1. Explicit path
    if let Some(path) = explicit {
        return (Some(path.to_path_buf()), ConfigSource::Explicit);
    }

    // 2. Environment variable (direct path)
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    // 3. Environment variable (config dir)
    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    // 4. XDG config directory
    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    // 5. System config
    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        return (Some(system_path), ConfigSource::SystemConfig);
    }

    // 6. Built-in default
    (None, ConfigSource::BuiltinDefault)
}

/// Resolve, read, parse, and validate the configuration.
pub fn load_config(explicit: Option<&Path>) -> ValidationResult<LoadedConfig> {
    let (path, source) = resolve_config_path(explicit);

    let config = match &path {
        Some(p) => {
            if !p.exists() {
                return Err(ValidationError::IoError(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            DetectionConfig::from_file(p)?
        }
        None => DetectionConfig::default(),
    };

    validate_config(&config)?;

    Ok(LoadedConfig {
        config,
        path,
        source,
    })
}

/// Get the XDG config directory for agent-features.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
