//! Orchestrator configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use iacrun_runner::RunConfig;
use serde::{Deserialize, Serialize};

use crate::environment::{ambient_snapshot, DEFAULT_REGION, REGION_VAR};
use crate::workspace::DEFAULT_PREFIX;

/// Default external tool executable.
pub const DEFAULT_EXECUTABLE: &str = "terraform";

/// Status reported for a run whose tool reported configuration problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticStatus {
    /// 400 with the full result body
    #[default]
    ClientError,
    /// 200 with `ok: false`
    Ok,
}

impl DiagnosticStatus {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClientError => 400,
            Self::Ok => 200,
        }
    }
}

impl FromStr for DiagnosticStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client-error" | "400" => Ok(Self::ClientError),
            "ok" | "200" => Ok(Self::Ok),
            other => Err(format!("unknown diagnostic status policy: {}", other)),
        }
    }
}

/// Configuration shared by every request an orchestrator handles.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Executable to invoke for every stage
    pub executable: String,
    /// Parent directory for workspaces (system temp dir when `None`)
    pub workspace_root: Option<PathBuf>,
    /// Workspace directory name prefix
    pub workspace_prefix: String,
    /// Region used when neither request nor environment provides one
    pub default_region: String,
    /// Per-invocation limits
    pub run_config: RunConfig,
    /// Status for diagnostic failures
    pub diagnostic_status: DiagnosticStatus,
    /// Fail `plan` when the JSON rendering fails
    pub require_plan_json: bool,
    /// Snapshot of the ambient environment, taken once
    pub ambient_env: BTreeMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_EXECUTABLE.to_string(),
            workspace_root: None,
            workspace_prefix: DEFAULT_PREFIX.to_string(),
            default_region: DEFAULT_REGION.to_string(),
            run_config: RunConfig::default(),
            diagnostic_status: DiagnosticStatus::default(),
            require_plan_json: false,
            ambient_env: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with the current process environment captured.
    ///
    /// An ambient `AWS_REGION` also becomes the default region.
    pub fn from_process_env() -> Self {
        let ambient_env = ambient_snapshot();
        let default_region = ambient_env
            .get(REGION_VAR)
            .filter(|r| !r.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        Self {
            ambient_env,
            default_region,
            ..Self::default()
        }
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = region.into();
        self
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn with_diagnostic_status(mut self, status: DiagnosticStatus) -> Self {
        self.diagnostic_status = status;
        self
    }

    pub fn require_plan_json(mut self, required: bool) -> Self {
        self.require_plan_json = required;
        self
    }

    pub fn with_ambient_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.ambient_env = env;
        self
    }
}
