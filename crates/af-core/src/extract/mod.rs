//! Per-agent feature extraction.
//!
//! Two independent sources feed one agent's [`af_common::FeatureSet`]:
//! - the cluster-wide agent ConfigMap (monitor aggregation)
//! - the agent's own status command (CNI chaining, L7 proxy, host firewall)

pub mod agent_status;
pub mod config_map;

pub use agent_status::{extract_features_from_agent_status, AgentStatus};
pub use config_map::{extract_features_from_config_map, MONITOR_AGGREGATION_KEY};
