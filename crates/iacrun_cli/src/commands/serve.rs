//! Serve command - run the HTTP API.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use iacrun_core::Orchestrator;
use iacrun_runner::ProcessRunner;

use super::{EngineArgs, MIB};
use crate::server::{self, AppState};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "IACRUN_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Bearer token required on the run endpoints
    #[arg(long, env = "RUNNER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Maximum request body size in MiB
    #[arg(long, env = "IACRUN_BODY_LIMIT_MB", default_value_t = 25)]
    pub body_limit_mb: usize,

    /// Deadline for a whole request in seconds (0 disables)
    #[arg(long, env = "IACRUN_REQUEST_TIMEOUT", default_value_t = 900)]
    pub request_timeout: u64,

    #[command(flatten)]
    pub engine: EngineArgs,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = args.engine.to_config();
    info!(
        executable = %config.executable,
        default_region = %config.default_region,
        max_output_bytes = config.run_config.max_output_bytes,
        stage_timeout_secs = config.run_config.timeout_seconds,
        "Starting iacrun server"
    );
    if args.token.is_none() {
        info!("No RUNNER_TOKEN configured, run endpoints are open");
    }

    let orchestrator = Orchestrator::new(Arc::new(ProcessRunner::new()), config);
    let request_timeout = (args.request_timeout > 0).then(|| Duration::from_secs(args.request_timeout));
    let state = AppState::new(orchestrator)
        .with_token(args.token)
        .with_request_timeout(request_timeout);

    let app = server::router(Arc::new(state), args.body_limit_mb.saturating_mul(MIB));
    server::serve(SocketAddr::new(args.host, args.port), app).await
}
