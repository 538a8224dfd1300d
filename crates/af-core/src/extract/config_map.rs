//! Features derived from the agent ConfigMap.

use af_common::{Feature, FeatureSet, FeatureStatus};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::cluster::ConfigMapReader;
use crate::error::ExtractError;

/// ConfigMap key holding the monitor aggregation level.
pub const MONITOR_AGGREGATION_KEY: &str = "monitor-aggregation";

/// Aggregation level assumed when the key is absent; also means "off".
pub const MONITOR_AGGREGATION_NONE: &str = "none";

/// Read `namespace/name` and record [`Feature::MonitorAggregation`] into `result`.
pub fn extract_features_from_config_map<R: ConfigMapReader + ?Sized>(
    reader: &R,
    namespace: &str,
    name: &str,
    cancel: &CancelToken,
    result: &mut FeatureSet,
) -> Result<(), ExtractError> {
    let cm = reader
        .get_config_map(namespace, name, cancel)
        .map_err(|source| ExtractError::ConfigSourceUnavailable {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        })?;

    let data = cm.data.ok_or_else(|| ExtractError::ConfigSourceEmpty {
        namespace: namespace.to_string(),
        name: name.to_string(),
    })?;

    let mode = data
        .get(MONITOR_AGGREGATION_KEY)
        .map(|v| v.to_lowercase())
        .unwrap_or_else(|| MONITOR_AGGREGATION_NONE.to_string());

    debug!(namespace, name, monitor_aggregation = %mode, "read agent ConfigMap");

    result.insert(
        Feature::MonitorAggregation,
        FeatureStatus {
            enabled: mode != MONITOR_AGGREGATION_NONE,
            mode,
        },
    );

    Ok(())
}
