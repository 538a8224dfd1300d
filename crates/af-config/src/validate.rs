//! Configuration validation errors and semantic validation.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::detection::DetectionConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
        }
    }
}

/// Longest DNS-1123 label (namespaces, container names).
const MAX_LABEL_LEN: usize = 63;

/// Longest DNS-1123 subdomain (object names).
const MAX_SUBDOMAIN_LEN: usize = 253;

static LABEL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Validate a detection configuration semantically.
pub fn validate_config(config: &DetectionConfig) -> ValidationResult<()> {
    validate_label("agent.namespace", &config.agent.namespace)?;
    validate_label("agent.container", &config.agent.container)?;

    if config.agent.status_command.is_empty() {
        return Err(ValidationError::MissingField(
            "agent.status_command".to_string(),
        ));
    }
    if config.agent.status_command.iter().any(|arg| arg.is_empty()) {
        return Err(invalid(
            "agent.status_command",
            "arguments must not be empty",
        ));
    }

    validate_subdomain("config_map.name", &config.config_map.name)?;
    if let Some(ns) = &config.config_map.namespace {
        validate_label("config_map.namespace", ns)?;
    }

    if config.kubectl.binary.as_os_str().is_empty() {
        return Err(ValidationError::MissingField("kubectl.binary".to_string()));
    }
    if let Some(context) = &config.kubectl.context {
        if context.trim().is_empty() {
            return Err(invalid("kubectl.context", "must not be blank"));
        }
    }
    if config.kubectl.timeout_ms == 0 {
        return Err(invalid("kubectl.timeout_ms", "must be greater than 0"));
    }
    if config.kubectl.max_output_bytes == 0 {
        return Err(invalid("kubectl.max_output_bytes", "must be greater than 0"));
    }

    Ok(())
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// DNS-1123 label: lowercase alphanumerics and '-', alphanumeric at both ends.
fn validate_label(field: &str, value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    if value.len() > MAX_LABEL_LEN {
        return Err(invalid(
            field,
            &format!("must be at most {} characters", MAX_LABEL_LEN),
        ));
    }
    if !is_label(value) {
        return Err(invalid(
            field,
            &format!("{:?} is not a valid DNS-1123 label", value),
        ));
    }
    Ok(())
}

/// DNS-1123 subdomain: dot-separated labels.
fn validate_subdomain(field: &str, value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    if value.len() > MAX_SUBDOMAIN_LEN {
        return Err(invalid(
            field,
            &format!("must be at most {} characters", MAX_SUBDOMAIN_LEN),
        ));
    }
    if !value.split('.').all(is_label) {
        return Err(invalid(
            field,
            &format!("{:?} is not a valid DNS-1123 subdomain", value),
        ));
    }
    Ok(())
}

fn is_label(value: &str) -> bool {
    LABEL_PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}
