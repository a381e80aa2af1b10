//! Error types for the orchestrator.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Broad classification of an [`OrchestratorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is unusable. Nothing was executed.
    Validation,
    /// The service failed to do its job.
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Infrastructure => "infrastructure",
        }
    }
}

/// Errors that can occur while orchestrating a request.
///
/// A tool run that exits non-zero is not represented here; it produces an
/// `ExecutionResult` with `ok = false`.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("no .tf files provided")]
    NoConfigurationFiles,

    #[error("no files provided")]
    EmptyFileSet,

    #[error("invalid file path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("duplicate file path {0:?}")]
    DuplicatePath(String),

    #[error("unsupported command: {0}")]
    UnsupportedOperation(String),

    #[error("file path {0:?} escapes the workspace")]
    PathEscape(String),

    #[error("failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace error: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("runner error: {0}")]
    Runner(#[from] iacrun_runner::RunnerError),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoConfigurationFiles
            | Self::EmptyFileSet
            | Self::InvalidPath { .. }
            | Self::DuplicatePath(_)
            | Self::UnsupportedOperation(_)
            | Self::PathEscape(_) => ErrorKind::Validation,
            Self::FileWrite { .. } | Self::Workspace(_) | Self::Runner(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// HTTP-style status for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Infrastructure => 500,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}
