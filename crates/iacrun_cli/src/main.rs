//! iacrun CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Infrastructure error
//! - 2: Invalid request or arguments
//! - 3: The tool reported problems with the configuration

use std::process::ExitCode;

use clap::Parser;
use iacrun_core::OrchestratorError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod server;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const DIAGNOSTIC_FAILURE: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args)
            .await
            .map(|()| ExitCodes::SUCCESS),
        Commands::Exec(args) => commands::exec::execute(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Logs go to stderr so `exec` output on stdout stays machine-readable.
fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("iacrun={level},tower_http={level},warn")));

    let registry = tracing_subscriber::registry().with(filter);
    let log_result = if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.chain().find_map(|c| c.downcast_ref::<OrchestratorError>()) {
        return if err.is_validation() {
            ExitCodes::INVALID_ARGS
        } else {
            ExitCodes::GENERAL_ERROR
        };
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("not found") || msg.contains("argument") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
