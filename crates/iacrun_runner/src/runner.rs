//! Tool runner trait and types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Invocation, RunConfig};
use crate::error::{RunnerError, RunnerResult};

/// Captured result of one process invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout followed by stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.ends_with('\n') {
            format!("{}{}", self.stdout, self.stderr)
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Turn a non-zero exit into [`RunnerError::ProcessFailed`].
    pub fn ensure_success(self) -> RunnerResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(RunnerError::ProcessFailed {
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs external tool invocations.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run one invocation to completion and capture its output.
    async fn invoke(
        &self,
        invocation: &Invocation,
        run_config: &RunConfig,
    ) -> RunnerResult<ProcessOutput>;

    /// Report the version string printed by `<executable> version -json`.
    ///
    /// `env` is the child's whole environment, `PATH` lookup included.
    async fn version(
        &self,
        executable: &str,
        env: &BTreeMap<String, String>,
    ) -> RunnerResult<String> {
        let invocation = Invocation::new(executable)
            .args(["version", "-json"])
            .envs(env.clone());
        let output = self
            .invoke(&invocation, &RunConfig::default().timeout(30))
            .await?
            .ensure_success()?;
        Ok(output.stdout.trim().to_string())
    }
}
