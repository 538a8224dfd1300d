//! Agent feature detection core.
//!
//! Determines which optional fabric features are active on a cluster by
//! probing each agent pod, establishes the first agent's features as the run
//! baseline, and warns when later agents disagree with it.
//!
//! ```ignore
//! use af_core::{CancelToken, KubectlClient, RunContext};
//! use af_common::{require_feature_enabled, Feature};
//!
//! let loaded = af_config::load_config(None)?;
//! let client = Arc::new(KubectlClient::new(&loaded.config.kubectl));
//!
//! let ctx = RunContext::new(loaded.config);
//! let pods = ctx.agent_pods(["cilium-x7k2p", "cilium-q9d4w"], client);
//! let summary = ctx.detect_features(&pods, &CancelToken::new())?;
//! if ctx.matches_requirements(&[require_feature_enabled(Feature::L7Proxy)]) {
//!     // run L7 tests
//! }
//! ```

pub mod cancel;
pub mod cluster;
pub mod detect;
pub mod error;
pub mod extract;
pub mod kubectl;
pub mod logging;
pub mod validate;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cancel::CancelToken;
pub use cluster::{agent_ref, AgentClient, AgentPod, ConfigMap, ConfigMapReader, PodExecutor};
pub use detect::{DetectionSummary, RunContext};
pub use error::{ClusterError, DetectionError, ErrorCategory, ExtractError, ExtractionStep};
pub use extract::{extract_features_from_agent_status, extract_features_from_config_map, AgentStatus};
pub use kubectl::KubectlClient;
pub use validate::{
    find_divergences, validate_feature_set, DiagnosticSink, Divergence, RecordingSink, TracingSink,
};
