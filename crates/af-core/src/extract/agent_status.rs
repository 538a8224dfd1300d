//! Features derived from the agent's `status -o json` output.
//!
//! Only the fields detection needs are decoded; everything else in the status
//! document is ignored. Sub-objects are `Option`s so that an omitted field is
//! distinguishable from one that is present but empty.
//!
//! The document and its `cniChaining`/`hostFirewall` sub-objects must be JSON
//! objects. Derived struct decoding would also accept arrays positionally.

use af_common::{AgentRef, Feature, FeatureSet, FeatureStatus};
use serde::de::{self, DeserializeOwned, Deserializer, Unexpected};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::cluster::PodExecutor;
use crate::error::ExtractError;

/// The subset of the agent status document used for feature detection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    #[serde(default, deserialize_with = "object_only")]
    pub cni_chaining: Option<CniChainingStatus>,
    /// Presence-only; contents are not inspected.
    #[serde(default)]
    pub proxy: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "object_only")]
    pub host_firewall: Option<HostFirewallStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CniChainingStatus {
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostFirewallStatus {
    #[serde(default)]
    pub mode: String,
}

/// Decode an optional sub-object, rejecting anything but an object or `null`.
fn object_only<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Map<String, Value>>::deserialize(deserializer)? {
        Some(map) => serde_json::from_value(Value::Object(map))
            .map(Some)
            .map_err(de::Error::custom),
        None => Ok(None),
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

impl AgentStatus {
    /// Decode a status document; the top level must be a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(de::Error::invalid_type(unexpected(&value), &"a status object"));
        }
        serde_json::from_value(value)
    }

    /// Write the CNI chaining, L7 proxy, and host firewall entries into `result`.
    pub fn record_features(&self, result: &mut FeatureSet) {
        let chaining_mode = self
            .cni_chaining
            .as_ref()
            .map(|c| c.mode.clone())
            .unwrap_or_default();
        result.insert(
            Feature::CniChaining,
            FeatureStatus {
                enabled: !chaining_mode.is_empty(),
                mode: chaining_mode,
            },
        );

        result.insert(
            Feature::L7Proxy,
            FeatureStatus {
                enabled: self.proxy.is_some(),
                mode: String::new(),
            },
        );

        let host_firewall = self
            .host_firewall
            .as_ref()
            .is_some_and(|hf| parse_bool_status(&hf.mode));
        result.insert(
            Feature::HostFirewall,
            FeatureStatus {
                enabled: host_firewall,
                mode: String::new(),
            },
        );
    }
}

/// `enabled` or `true`, ignoring ASCII case.
fn parse_bool_status(s: &str) -> bool {
    s.eq_ignore_ascii_case("enabled") || s.eq_ignore_ascii_case("true")
}

/// Run the status command in `agent` and record the three derived features.
pub fn extract_features_from_agent_status<E: PodExecutor + ?Sized>(
    executor: &E,
    agent: &AgentRef,
    command: &[String],
    cancel: &CancelToken,
    result: &mut FeatureSet,
) -> Result<(), ExtractError> {
    let stdout = executor
        .exec_in_pod(agent, command, cancel)
        .map_err(|source| ExtractError::RemoteExecFailed {
            agent: agent.name(),
            source,
        })?;

    let status = AgentStatus::from_slice(&stdout).map_err(|source| {
        ExtractError::StatusParseFailed {
            agent: agent.name(),
            source,
        }
    })?;

    debug!(
        agent = %agent,
        bytes = stdout.len(),
        cni_chaining = status.cni_chaining.is_some(),
        proxy = status.proxy.is_some(),
        host_firewall = status.host_firewall.is_some(),
        "decoded agent status"
    );

    status.record_features(result);
    Ok(())
}
