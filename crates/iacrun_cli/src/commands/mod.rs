//! CLI command definitions.
//!
//! `serve` runs the HTTP gate, `exec` runs one operation against a local
//! directory. Both share the engine options in [`EngineArgs`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use iacrun_core::{DiagnosticStatus, OrchestratorConfig, DEFAULT_EXECUTABLE};
use iacrun_runner::RunConfig;

pub mod exec;
pub mod serve;

const MIB: usize = 1024 * 1024;

/// iacrun - ephemeral-workspace Terraform runner
#[derive(Parser)]
#[command(name = "iacrun")]
#[command(version, about = "iacrun - ephemeral-workspace Terraform runner")]
#[command(long_about = r#"
iacrun writes a set of Terraform configuration files into a throwaway
directory, runs one operation against them and reports a single JSON result.
The directory is always removed afterwards.

OPERATIONS:
  format-check  → terraform fmt -check (never initializes)
  validate      → offline init, then terraform validate
  plan          → full init, plan, show (and show -json when possible)

EXIT CODES (exec):
  0 - Success
  1 - Infrastructure error
  2 - Invalid request
  3 - Tool reported problems
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "IACRUN_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve(serve::ServeArgs),

    /// Run one operation against a local directory
    Exec(exec::ExecArgs),
}

/// Options shared by every command that runs the external tool.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Terraform executable
    #[arg(long, env = "TERRAFORM_BIN", default_value = DEFAULT_EXECUTABLE)]
    pub terraform_bin: String,

    /// Parent directory for temporary workspaces
    #[arg(long, env = "IACRUN_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Region used when a request does not name one
    #[arg(long, env = "IACRUN_DEFAULT_REGION")]
    pub default_region: Option<String>,

    /// Per-stream output ceiling in MiB
    #[arg(long, env = "IACRUN_MAX_OUTPUT_MB", default_value_t = 50)]
    pub max_output_mb: usize,

    /// Per-stage timeout in seconds
    #[arg(long, env = "IACRUN_STAGE_TIMEOUT", default_value_t = 600)]
    pub stage_timeout: u64,

    /// Status for runs with diagnostics (client-error or ok)
    #[arg(long, env = "IACRUN_DIAGNOSTIC_STATUS", default_value = "client-error")]
    pub diagnostic_status: DiagnosticStatus,

    /// Treat a failed `show -json` as a failed plan
    #[arg(long, env = "IACRUN_REQUIRE_PLAN_JSON")]
    pub require_plan_json: bool,
}

impl EngineArgs {
    pub fn to_config(&self) -> OrchestratorConfig {
        let run_config = RunConfig::default()
            .timeout(self.stage_timeout)
            .max_output(self.max_output_mb.saturating_mul(MIB));

        let mut config = OrchestratorConfig::from_process_env()
            .with_executable(&self.terraform_bin)
            .with_run_config(run_config)
            .with_diagnostic_status(self.diagnostic_status)
            .require_plan_json(self.require_plan_json);

        if let Some(root) = &self.workspace_root {
            config = config.with_workspace_root(root);
        }
        if let Some(region) = self.default_region.as_deref().filter(|r| !r.is_empty()) {
            config = config.with_default_region(region);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_args_map_to_config() {
        let cli = Cli::parse_from([
            "iacrun",
            "exec",
            "plan",
            "./infra",
            "--terraform-bin",
            "/opt/tf/terraform",
            "--max-output-mb",
            "2",
            "--stage-timeout",
            "30",
            "--diagnostic-status",
            "ok",
            "--default-region",
            "eu-west-1",
        ]);

        let Commands::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        let config = args.engine.to_config();
        assert_eq!(config.executable, "/opt/tf/terraform");
        assert_eq!(config.run_config.max_output_bytes, 2 * MIB);
        assert_eq!(config.run_config.timeout_seconds, 30);
        assert_eq!(config.diagnostic_status, DiagnosticStatus::Ok);
        assert_eq!(config.default_region, "eu-west-1");
        assert!(!config.require_plan_json);
    }

    #[test]
    fn test_unknown_diagnostic_status_rejected() {
        let parsed = Cli::try_parse_from([
            "iacrun",
            "serve",
            "--diagnostic-status",
            "maybe",
        ]);
        assert!(parsed.is_err());
    }
}
