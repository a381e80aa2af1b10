//! Exec command - run one operation against a local directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use iacrun_core::{ExecutionRequest, FileSet, Operation, Orchestrator, Outcome};
use iacrun_runner::ProcessRunner;

use super::EngineArgs;
use crate::ExitCodes;

/// Directories never copied into a workspace.
const SKIPPED_DIRS: &[&str] = &[".terraform", ".git"];

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Operation to run (format-check, validate, plan)
    pub operation: String,

    /// Directory holding the configuration files
    pub dir: std::path::PathBuf,

    /// Region for the tool environment
    #[arg(long)]
    pub region: Option<String>,

    /// Extra environment variables (KEY=VALUE)
    #[arg(short, long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Pretty-print the result
    #[arg(long)]
    pub pretty: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

pub async fn execute(args: ExecArgs) -> Result<u8> {
    let operation: Operation = args.operation.parse()?;
    let files = read_dir(&args.dir)?;
    info!(
        "Running {} against {} ({} files)",
        operation,
        args.dir.display(),
        files.len()
    );

    let orchestrator = Orchestrator::new(Arc::new(ProcessRunner::new()), args.engine.to_config());

    let mut request = ExecutionRequest::new(operation, files)
        .with_env_overrides(args.env.into_iter().collect::<BTreeMap<_, _>>());
    if let Some(region) = args.region {
        request = request.with_region(region);
    }

    let result = orchestrator.execute(request).await?;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", rendered);

    Ok(match result.outcome {
        Outcome::Success => ExitCodes::SUCCESS,
        Outcome::DiagnosticFailure => ExitCodes::DIAGNOSTIC_FAILURE,
    })
}

/// Collect the regular files under `dir` as a file set keyed by relative path.
fn read_dir(dir: &Path) -> Result<FileSet> {
    if !dir.is_dir() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        });

    for entry in walker {
        let entry = entry.context("failed to walk configuration directory")?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(dir)?;
        let Some(path) = relative.to_str() else {
            warn!("Skipping non UTF-8 path {:?}", relative);
            continue;
        };
        let path = path.replace(std::path::MAIN_SEPARATOR, "/");

        match std::fs::read_to_string(entry.path()) {
            Ok(content) => {
                debug!("Read {} ({} bytes)", path, content.len());
                entries.push((path, content));
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!("Skipping binary file {}", path);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", entry.path().display()))
            }
        }
    }

    Ok(FileSet::new(entries)?)
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    if key.is_empty() {
        return Err(format!("empty variable name in {:?}", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("TF_LOG=debug").unwrap(),
            ("TF_LOG".to_string(), "debug".to_string())
        );
        assert_eq!(
            parse_key_value("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_read_dir_collects_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.tf"), "terraform {}\n").unwrap();
        std::fs::create_dir_all(dir.path().join("modules/net")).unwrap();
        std::fs::write(dir.path().join("modules/net/vpc.tf"), "# vpc\n").unwrap();
        std::fs::create_dir_all(dir.path().join(".terraform/providers")).unwrap();
        std::fs::write(dir.path().join(".terraform/providers/lock"), "x").unwrap();

        let files = read_dir(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["main.tf", "modules/net/vpc.tf"]);
    }

    #[test]
    fn test_read_dir_without_config_is_validation_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "# infra\n").unwrap();

        let err = read_dir(dir.path()).unwrap_err();
        let inner = err.downcast_ref::<iacrun_core::OrchestratorError>().unwrap();
        assert!(inner.is_validation());
    }

    #[test]
    fn test_read_dir_missing() {
        assert!(read_dir(Path::new("/definitely/not/here")).is_err());
    }
}
