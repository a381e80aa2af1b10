//! # iacrun_core
//!
//! Ephemeral-workspace command orchestration for Terraform.
//!
//! A request names an operation and carries a set of configuration files.
//! The orchestrator writes them into a fresh temporary directory, drives
//! Terraform through the stages of that operation, and returns one
//! [`ExecutionResult`] describing how far it got and what the tool said.
//! The directory is removed on every exit path.
//!
//! ## Operations
//!
//! - `format-check`: `fmt -check`, never initializes
//! - `validate`: offline `init -backend=false`, then `validate`
//! - `plan`: full `init`, `plan -out`, `show`, and best-effort `show -json`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iacrun_core::{ExecutionRequest, FileSet, Operation, Orchestrator, OrchestratorConfig};
//! use iacrun_runner::ProcessRunner;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(
//!     Arc::new(ProcessRunner::new()),
//!     OrchestratorConfig::from_process_env(),
//! );
//!
//! let files = FileSet::new([("main.tf", "terraform {}\n")])?;
//! let result = orchestrator
//!     .execute(ExecutionRequest::new(Operation::Validate, files))
//!     .await?;
//! println!("ok = {}", result.ok);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod fileset;
pub mod operation;
pub mod orchestrator;
pub mod pipeline;
pub mod result;
pub mod terraform;
pub mod workspace;

pub use config::{DiagnosticStatus, OrchestratorConfig, DEFAULT_EXECUTABLE};
pub use diagnostics::{Diagnostic, Severity};
pub use environment::{ToolEnvironment, DEFAULT_REGION, REGION_VAR};
pub use error::{ErrorKind, OrchestratorError, OrchestratorResult};
pub use fileset::{is_config_file, FileEntry, FileSet, FilesPayload, CONFIG_SUFFIXES};
pub use operation::Operation;
pub use orchestrator::{ExecutionRequest, Orchestrator};
pub use pipeline::{Pipeline, PipelineState};
pub use result::{ExecutionResult, Outcome, ResultAssembler, StageResult, StagesReached};
pub use terraform::{stages_for, InitMode, Stage, StagePlan, PLAN_FILE};
pub use workspace::Workspace;
