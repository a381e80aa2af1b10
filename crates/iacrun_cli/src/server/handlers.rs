//! Route handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use iacrun_core::{ExecutionRequest, FileSet, FilesPayload, Operation, OrchestratorResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::errors::ApiError;
use super::AppState;

/// Body accepted by `/run` and `/validate`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunRequest {
    #[serde(default, alias = "operation")]
    pub command: Option<String>,
    #[serde(default)]
    pub files: Option<FilesPayload>,
    #[serde(default, alias = "environmentOverrides")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub region: Option<String>,
}

impl RunRequest {
    /// Normalize into an execution request; `forced` overrides `command`.
    pub(crate) fn into_request(self, forced: Option<Operation>) -> OrchestratorResult<ExecutionRequest> {
        let operation = match forced {
            Some(op) => op,
            None => self
                .command
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or("validate")
                .parse::<Operation>()?,
        };

        let files = FileSet::from_payload(self.files.unwrap_or_default())?;
        let mut request = ExecutionRequest::new(operation, files)
            .with_env_overrides(self.env.unwrap_or_default());
        if let Some(region) = self.region.filter(|r| !r.is_empty()) {
            request = request.with_region(region);
        }
        Ok(request)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "rejected request body");
        ApiError::bad_request(rejection.body_text()).with_status(rejection.status())
    }
}

pub(crate) async fn root() -> &'static str {
    "OK"
}

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ask the external tool for `version -json`.
pub(crate) async fn tool_health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let config = state.orchestrator.config();
    let executable = &config.executable;
    match state
        .orchestrator
        .runner()
        .version(executable, &config.ambient_env)
        .await
    {
        Ok(raw) => {
            let version = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
            Ok(Json(json!({ "status": "ok", "terraform": version })))
        }
        Err(e) => {
            warn!(error = %e, "tool version check failed");
            Err(ApiError::unavailable(format!("{} is unavailable", executable)))
        }
    }
}

pub(crate) async fn run(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    execute(&state, body.into_request(None)?).await
}

/// Legacy endpoint: always validates.
pub(crate) async fn validate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    execute(&state, body.into_request(Some(Operation::Validate))?).await
}

async fn execute(state: &AppState, request: ExecutionRequest) -> Result<Response, ApiError> {
    let execution = state.orchestrator.execute(request);
    let result = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, execution).await.map_err(|_| {
            warn!(timeout_secs = limit.as_secs(), "request deadline exceeded");
            ApiError::deadline_exceeded()
        })??,
        None => execution.await?,
    };

    let status = StatusCode::from_u16(state.orchestrator.status_for(&result))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(result)).into_response())
}
