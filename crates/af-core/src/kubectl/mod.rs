//! `kubectl`-backed cluster client.
//!
//! Implements [`ConfigMapReader`] and [`PodExecutor`] by shelling out to
//! kubectl through [`ToolRunner`], which bounds each invocation by timeout and
//! output size and stops it when the run is cancelled.

pub mod tool_runner;

pub use tool_runner::{ToolConfig, ToolError, ToolOutput, ToolRunner};

use af_common::AgentRef;
use af_config::KubectlSettings;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::cluster::{ConfigMap, ConfigMapReader, PodExecutor};
use crate::error::ClusterError;

/// Exit code reported when kubectl was killed by a signal.
const SIGNALLED_EXIT_CODE: i32 = -1;

/// Cluster client that runs kubectl for every request.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    settings: KubectlSettings,
    runner: ToolRunner,
}

impl KubectlClient {
    pub fn new(settings: &KubectlSettings) -> Self {
        let runner = ToolRunner::new(ToolConfig {
            timeout: Duration::from_millis(settings.timeout_ms),
            max_output_bytes: settings.max_output_bytes,
        });
        KubectlClient {
            settings: settings.clone(),
            runner,
        }
    }

    pub fn settings(&self) -> &KubectlSettings {
        &self.settings
    }

    fn binary(&self) -> Result<&str, ClusterError> {
        self.settings.binary.to_str().ok_or_else(|| {
            ClusterError::Tool(ToolError::InvalidPath(format!(
                "kubectl binary path is not UTF-8: {}",
                self.settings.binary.display()
            )))
        })
    }

    fn run(&self, args: &[String], cancel: &CancelToken) -> Result<ToolOutput, ClusterError> {
        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        let output = self.runner.run(self.binary()?, args, cancel)?;
        if output.cancelled {
            return Err(ClusterError::Cancelled);
        }
        if output.timed_out {
            warn!(
                timeout_ms = self.settings.timeout_ms,
                args = ?args,
                "kubectl timed out"
            );
            return Err(ClusterError::TimedOut);
        }
        Ok(output)
    }
}

/// Flags shared by every invocation.
fn global_args(settings: &KubectlSettings) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(ref context) = settings.context {
        args.push("--context".to_string());
        args.push(context.clone());
    }

    if let Some(ref kubeconfig) = settings.kubeconfig {
        args.push("--kubeconfig".to_string());
        args.push(kubeconfig.display().to_string());
    }

    args
}

fn build_get_config_map_args(settings: &KubectlSettings, namespace: &str, name: &str) -> Vec<String> {
    let mut args = global_args(settings);
    args.extend(
        ["get", "configmap", name, "-n", namespace, "-o", "json"]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}

fn build_exec_args(settings: &KubectlSettings, agent: &AgentRef, command: &[String]) -> Vec<String> {
    let mut args = global_args(settings);
    args.extend(
        [
            "exec",
            "-n",
            agent.namespace.as_str(),
            agent.pod.as_str(),
            "-c",
            agent.container.as_str(),
            "--",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.extend(command.iter().cloned());
    args
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains("not found")
}

fn command_failed(output: &ToolOutput) -> ClusterError {
    ClusterError::CommandFailed {
        code: output.exit_code.unwrap_or(SIGNALLED_EXIT_CODE),
        stderr: output.stderr_str().trim().to_string(),
    }
}

fn reject_truncated(output: &ToolOutput, limit: usize) -> Result<(), ClusterError> {
    if output.truncated {
        return Err(ClusterError::InvalidResponse(format!(
            "kubectl output exceeded {} bytes",
            limit
        )));
    }
    Ok(())
}

impl ConfigMapReader for KubectlClient {
    fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<ConfigMap, ClusterError> {
        let args = build_get_config_map_args(&self.settings, namespace, name);
        let output = self.run(&args, cancel)?;

        if !output.success() {
            let stderr = output.stderr_str();
            if is_not_found(&stderr) {
                return Err(ClusterError::NotFound {
                    kind: "configmap".to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
            return Err(command_failed(&output));
        }
        reject_truncated(&output, self.settings.max_output_bytes)?;

        let cm: ConfigMap = serde_json::from_slice(&output.stdout)
            .map_err(|e| ClusterError::InvalidResponse(format!("configmap JSON: {}", e)))?;
        debug!(
            namespace,
            name,
            keys = cm.data.as_ref().map_or(0, |d| d.len()),
            "fetched ConfigMap"
        );
        Ok(cm)
    }
}

impl PodExecutor for KubectlClient {
    fn exec_in_pod(
        &self,
        agent: &AgentRef,
        command: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, ClusterError> {
        let args = build_exec_args(&self.settings, agent, command);
        let output = self.run(&args, cancel)?;

        if !output.success() {
            return Err(command_failed(&output));
        }
        reject_truncated(&output, self.settings.max_output_bytes)?;

        debug!(agent = %agent, bytes = output.stdout.len(), "exec complete");
        Ok(output.stdout)
    }
}
