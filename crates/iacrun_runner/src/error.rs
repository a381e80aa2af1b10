//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Which captured stream an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Errors that can occur while invoking an external tool.
///
/// A process that runs and exits non-zero is not an error at this layer;
/// see [`crate::ProcessOutput::ensure_success`] for callers that want one.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn {executable}: {source}")]
    SpawnFailed {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process exited with code {exit_code}: {}", last_line(.stderr))]
    ProcessFailed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Process {stream} exceeded the {limit} byte output limit")]
    OutputTooLarge { stream: OutputStream, limit: usize },

    #[error("Process timeout after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("Unknown error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_failed_message_uses_last_stderr_line() {
        let err = RunnerError::ProcessFailed {
            exit_code: 1,
            stdout: String::new(),
            stderr: "first\nError: bad things\n\n".to_string(),
        };
        assert_eq!(err.to_string(), "Process exited with code 1: Error: bad things");
    }

    #[test]
    fn test_output_too_large_message() {
        let err = RunnerError::OutputTooLarge {
            stream: OutputStream::Stderr,
            limit: 16,
        };
        assert_eq!(err.to_string(), "Process stderr exceeded the 16 byte output limit");
    }
}
