//! Agent feature model shared across the agent-features crates.
//!
//! This crate provides the value types the detection core reasons about:
//! - The fixed catalog of optional fabric features
//! - Per-feature on/off-plus-mode status
//! - Feature sets (one per agent, or the run baseline)
//! - Declarative requirements used for test selection
//! - Agent pod identity

pub mod feature;
pub mod id;

pub use feature::{
    require_feature_enabled, require_feature_mode, Feature, FeatureRequirement, FeatureSet,
    FeatureStatus, UnknownFeature,
};
pub use id::AgentRef;
