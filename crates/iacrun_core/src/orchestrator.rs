//! Request-level entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use iacrun_runner::ToolRunner;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::environment::ToolEnvironment;
use crate::error::{ErrorKind, OrchestratorError, OrchestratorResult};
use crate::fileset::FileSet;
use crate::operation::Operation;
use crate::pipeline::Pipeline;
use crate::result::{ExecutionResult, Outcome};
use crate::workspace::Workspace;

/// A validated request.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub operation: Operation,
    pub files: FileSet,
    pub env_overrides: BTreeMap<String, String>,
    pub region: Option<String>,
}

impl ExecutionRequest {
    pub fn new(operation: Operation, files: FileSet) -> Self {
        Self {
            operation,
            files,
            env_overrides: BTreeMap::new(),
            region: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_env_overrides(mut self, env: BTreeMap<String, String>) -> Self {
        self.env_overrides = env;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Runs requests, each in its own disposable workspace.
///
/// Cheap to clone and safe to share between concurrent requests.
#[derive(Clone)]
pub struct Orchestrator {
    runner: Arc<dyn ToolRunner>,
    config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn ToolRunner>, config: OrchestratorConfig) -> Self {
        Self {
            runner,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<dyn ToolRunner> {
        &self.runner
    }

    /// HTTP-style status for a finished run.
    pub fn status_for(&self, result: &ExecutionResult) -> u16 {
        match result.outcome {
            Outcome::Success => 200,
            Outcome::DiagnosticFailure => self.config.diagnostic_status.status_code(),
        }
    }

    /// Execute one request.
    ///
    /// The workspace is removed before this returns, whatever the outcome.
    /// Dropping the returned future also removes it and kills any running
    /// child process.
    pub async fn execute(&self, request: ExecutionRequest) -> OrchestratorResult<ExecutionResult> {
        let request_id = Uuid::new_v4();
        let span = info_span!("execute", %request_id, operation = %request.operation);

        async move {
            let result = self.execute_inner(&request).await;
            match &result {
                Ok(r) => info!(ok = r.ok, duration_ms = r.duration_ms, "Request finished"),
                Err(e) if e.kind() == ErrorKind::Infrastructure => {
                    error!("Request failed: {}", e)
                }
                Err(e) => info!("Request rejected: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_inner(&self, request: &ExecutionRequest) -> OrchestratorResult<ExecutionResult> {
        let region = request
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(self.config.default_region.as_str());
        let env = ToolEnvironment::build(&self.config.ambient_env, &request.env_overrides, Some(region));

        let workspace = Workspace::create(
            self.config.workspace_root.as_deref(),
            &self.config.workspace_prefix,
        )
        .map_err(OrchestratorError::Workspace)?;
        info!(
            "Executing {} with {} files in {:?}",
            request.operation,
            request.files.len(),
            workspace.path()
        );

        let pipeline = Pipeline::new(self.runner.as_ref(), &self.config, request.operation, env);
        let result = pipeline.run(&workspace, &request.files).await;
        workspace.destroy();
        result
    }
}
