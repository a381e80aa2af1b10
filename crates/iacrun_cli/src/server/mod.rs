//! HTTP request gate in front of the orchestrator.
//!
//! Routes:
//! - `GET /`, `GET /health`: liveness
//! - `GET /health/tool`: `terraform version -json` check
//! - `POST /run`: run the requested operation
//! - `POST /validate`: legacy, always validates

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use iacrun_core::Orchestrator;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod auth;
mod errors;
mod handlers;

/// State shared by every handler.
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Bearer token required on the run endpoints, if any
    pub token: Option<String>,
    /// Deadline for one whole request, if any
    pub request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            token: None,
            request_timeout: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>, body_limit: usize) -> Router {
    let gated = Router::new()
        .route("/run", post(handlers::run))
        .route("/validate", post(handlers::validate))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/health/tool", get(handlers::tool_health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until interrupted.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("iacrun listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use iacrun_core::{DiagnosticStatus, OrchestratorConfig};
    use iacrun_runner::{
        Invocation, MockResponse, MockRunner, ProcessOutput, RunConfig, RunnerResult, ToolRunner,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const LIMIT: usize = 1024 * 1024;

    struct Harness {
        app: Router,
        runner: MockRunner,
        root: TempDir,
    }

    fn harness_with(runner: MockRunner, configure: impl FnOnce(AppState) -> AppState) -> Harness {
        let root = TempDir::new().unwrap();
        let config = OrchestratorConfig::new().with_workspace_root(root.path());
        let orchestrator = Orchestrator::new(Arc::new(runner.clone()), config);
        let state = configure(AppState::new(orchestrator));
        Harness {
            app: router(Arc::new(state), LIMIT),
            runner,
            root,
        }
    }

    fn harness(runner: MockRunner) -> Harness {
        harness_with(runner, |s| s)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), LIMIT).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn main_tf() -> Value {
        json!({ "main.tf": "terraform {}\n" })
    }

    fn workspace_root_is_empty(h: &Harness) -> bool {
        std::fs::read_dir(h.root.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let h = harness(MockRunner::new());

        let response = h.app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), LIMIT).await.unwrap();
        assert_eq!(&bytes[..], b"OK");

        let response = h.app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_tool_health_reports_version() {
        let runner = MockRunner::new().on(
            "version",
            MockResponse::success(r#"{"terraform_version":"1.7.5"}"#),
        );
        let h = harness(runner);

        let response = h.app.clone().oneshot(get("/health/tool")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["terraform"]["terraform_version"], "1.7.5");
    }

    #[tokio::test]
    async fn test_tool_health_runs_with_ambient_path() {
        let runner = MockRunner::new();
        let root = TempDir::new().unwrap();
        let ambient = std::collections::BTreeMap::from([(
            "PATH".to_string(),
            "/usr/local/bin:/usr/bin".to_string(),
        )]);
        let config = OrchestratorConfig::new()
            .with_workspace_root(root.path())
            .with_ambient_env(ambient.clone());
        let orchestrator = Orchestrator::new(Arc::new(runner.clone()), config);
        let app = router(Arc::new(AppState::new(orchestrator)), LIMIT);

        let response = app.oneshot(get("/health/tool")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let call = &runner.get_calls()[0];
        assert_eq!(call.args, vec!["version", "-json"]);
        assert_eq!(call.env, ambient);
    }

    #[tokio::test]
    async fn test_tool_health_unavailable() {
        let h = harness(MockRunner::new().simulate_spawn_failure("terraform"));

        let response = h.app.clone().oneshot(get("/health/tool")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["kind"], "infrastructure");
    }

    #[tokio::test]
    async fn test_run_validate_success() {
        let h = harness(MockRunner::new());

        let response = h
            .app
            .clone()
            .oneshot(post("/run", json!({ "command": "validate", "files": main_tf() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["operation"], "validate");
        assert_eq!(body["stagesReached"]["init"], true);
        assert_eq!(body["stagesReached"]["validate"], true);
        assert_eq!(h.runner.subcommands(), vec!["init", "validate"]);
        assert!(workspace_root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_diagnostic_failure_is_client_error_by_default() {
        let runner = MockRunner::new().on("fmt", MockResponse::failure(3, "").with_stdout("main.tf\n"));
        let h = harness(runner);

        let response = h
            .app
            .clone()
            .oneshot(post("/run", json!({ "command": "fmt", "files": main_tf() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["operation"], "format-check");
        assert_eq!(body["stagesReached"]["format"], true);
        assert_eq!(body["stagesReached"]["init"], false);
    }

    #[tokio::test]
    async fn test_diagnostic_status_policy_ok() {
        let runner = MockRunner::new().on("fmt", MockResponse::failure(3, "").with_stdout("main.tf\n"));
        let root = TempDir::new().unwrap();
        let config = OrchestratorConfig::new()
            .with_workspace_root(root.path())
            .with_diagnostic_status(DiagnosticStatus::Ok);
        let state = AppState::new(Orchestrator::new(Arc::new(runner), config));
        let app = router(Arc::new(state), LIMIT);

        let response = app
            .oneshot(post("/run", json!({ "command": "format-check", "files": main_tf() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["ok"], false);
    }

    #[tokio::test]
    async fn test_missing_config_files_rejected_before_runner() {
        let h = harness(MockRunner::new());

        let response = h
            .app
            .clone()
            .oneshot(post("/run", json!({ "files": { "README.md": "# hi" } })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(
            body,
            json!({ "ok": false, "error": "no .tf files provided", "kind": "validation" })
        );
        assert_eq!(h.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_command() {
        let h = harness(MockRunner::new());

        let response = h
            .app
            .clone()
            .oneshot(post("/run", json!({ "command": "apply", "files": main_tf() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "unsupported command: apply");
        assert_eq!(h.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        let h = harness(MockRunner::new());
        let request = Request::builder()
            .method("POST")
            .uri("/run")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ not json"))
            .unwrap();

        let response = h.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "validation");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let root = TempDir::new().unwrap();
        let config = OrchestratorConfig::new().with_workspace_root(root.path());
        let state = AppState::new(Orchestrator::new(Arc::new(MockRunner::new()), config));
        let app = router(Arc::new(state), 64);

        let big = "#".repeat(1024);
        let response = app
            .oneshot(post("/run", json!({ "files": { "main.tf": big } })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_legacy_validate_endpoint_forces_validate() {
        let h = harness(MockRunner::new());

        let response = h
            .app
            .clone()
            .oneshot(post("/validate", json!({ "command": "plan", "files": main_tf() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["operation"], "validate");
        assert!(!h.runner.was_called("plan"));
    }

    #[tokio::test]
    async fn test_region_and_env_reach_the_tool() {
        let h = harness(MockRunner::new());

        let response = h
            .app
            .clone()
            .oneshot(post(
                "/run",
                json!({
                    "command": "validate",
                    "files": main_tf(),
                    "env": { "TF_LOG": "trace" },
                    "region": "ap-south-1"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let call = &h.runner.get_calls()[0];
        assert_eq!(call.env.get("AWS_REGION").map(String::as_str), Some("ap-south-1"));
        assert_eq!(call.env.get("TF_LOG").map(String::as_str), Some("trace"));
        assert_eq!(call.env.get("TF_IN_AUTOMATION").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_infrastructure_error_hides_detail() {
        let h = harness(MockRunner::new().simulate_spawn_failure("terraform"));

        let response = h
            .app
            .clone()
            .oneshot(post("/run", json!({ "files": main_tf() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "ok": false, "error": "internal error", "kind": "infrastructure" })
        );
        assert!(workspace_root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_bearer_gate() {
        let h = harness_with(MockRunner::new(), |s| s.with_token(Some("s3cret".into())));
        let body = json!({ "files": main_tf() });

        let response = h.app.clone().oneshot(post("/run", body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "missing bearer token");

        let mut wrong = post("/run", body.clone());
        wrong
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
        let response = h.app.clone().oneshot(wrong).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let mut right = post("/validate", body);
        right
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        let response = h.app.clone().oneshot(right).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Health stays open.
        let response = h.app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.runner.call_count(), 2);
    }

    struct StallingRunner;

    #[async_trait]
    impl ToolRunner for StallingRunner {
        async fn invoke(&self, _: &Invocation, _: &RunConfig) -> RunnerResult<ProcessOutput> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_request_deadline() {
        let root = TempDir::new().unwrap();
        let config = OrchestratorConfig::new().with_workspace_root(root.path());
        let state = AppState::new(Orchestrator::new(Arc::new(StallingRunner), config))
            .with_request_timeout(Some(Duration::from_millis(100)));
        let app = router(Arc::new(state), LIMIT);

        let response = app
            .oneshot(post("/run", json!({ "files": main_tf() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json_body(response).await["kind"], "infrastructure");
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }
}
