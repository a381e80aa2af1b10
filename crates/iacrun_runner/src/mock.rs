//! Mock tool runner for testing.
//!
//! Provides a configurable mock implementation of the [`ToolRunner`] trait
//! for use in tests without requiring the external tool to be installed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use walkdir::WalkDir;

use crate::config::{Invocation, RunConfig};
use crate::error::{OutputStream, RunnerError, RunnerResult};
use crate::runner::{ProcessOutput, ToolRunner};

/// Predefined mock response for an invocation.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Failure the mock should raise instead of returning a response.
#[derive(Debug, Clone)]
enum SimulatedFailure {
    Spawn(String),
    OutputTooLarge,
    Timeout,
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub executable: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<PathBuf>,
    /// Whether the working directory existed when the call was made
    pub workdir_existed: bool,
    /// Files present in the working directory (relative, sorted)
    pub workdir_files: Vec<String>,
    pub max_output_bytes: usize,
}

impl CapturedCall {
    /// The subcommand (first argument), if any.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Mock tool runner for testing.
///
/// This runner captures all calls and returns predefined responses in order,
/// allowing tests to verify pipeline behavior without spawning processes.
#[derive(Clone)]
pub struct MockRunner {
    /// Predefined responses, consumed in order.
    responses: Arc<RwLock<Vec<MockResponse>>>,
    /// Responses keyed by subcommand, taking precedence over the ordered list.
    by_subcommand: Arc<RwLock<BTreeMap<String, MockResponse>>>,
    /// Index of next ordered response to return.
    response_index: Arc<AtomicUsize>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Simulated infrastructure failure.
    simulate_failure: Arc<RwLock<Option<SimulatedFailure>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(Vec::new())),
            by_subcommand: Arc::new(RwLock::new(BTreeMap::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Add a mock response for the next invocation.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Set multiple ordered responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Respond to every invocation of `subcommand` with `response`.
    pub fn on(self, subcommand: impl Into<String>, response: MockResponse) -> Self {
        self.by_subcommand.write().insert(subcommand.into(), response);
        self
    }

    /// Fail every invocation as if the executable could not be spawned.
    pub fn simulate_spawn_failure(self, executable: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(SimulatedFailure::Spawn(executable.into()));
        self
    }

    /// Fail every invocation with an output ceiling violation.
    pub fn simulate_output_too_large(self) -> Self {
        *self.simulate_failure.write() = Some(SimulatedFailure::OutputTooLarge);
        self
    }

    /// Fail every invocation with a timeout.
    pub fn simulate_timeout(self) -> Self {
        *self.simulate_failure.write() = Some(SimulatedFailure::Timeout);
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Subcommands invoked so far, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.captured_calls
            .read()
            .iter()
            .filter_map(|c| c.subcommand().map(str::to_string))
            .collect()
    }

    /// Check if a specific subcommand was invoked.
    pub fn was_called(&self, subcommand: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.subcommand() == Some(subcommand))
    }

    /// Get calls to a specific subcommand.
    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    fn record_call(&self, invocation: &Invocation, run_config: &RunConfig) {
        let (workdir_existed, workdir_files) = match &invocation.workdir {
            Some(dir) => (dir.is_dir(), list_files(dir)),
            None => (false, Vec::new()),
        };
        self.captured_calls.write().push(CapturedCall {
            executable: invocation.executable.clone(),
            args: invocation.args.clone(),
            env: invocation.env.clone(),
            workdir: invocation.workdir.clone(),
            workdir_existed,
            workdir_files,
            max_output_bytes: run_config.max_output_bytes,
        });
    }

    fn next_response(&self, invocation: &Invocation) -> MockResponse {
        if let Some(sub) = invocation.args.first() {
            if let Some(response) = self.by_subcommand.read().get(sub) {
                return response.clone();
            }
        }
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }

    fn check_failure(&self, run_config: &RunConfig) -> RunnerResult<()> {
        match self.simulate_failure.read().clone() {
            None => Ok(()),
            Some(SimulatedFailure::Spawn(executable)) => Err(RunnerError::SpawnFailed {
                executable,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            Some(SimulatedFailure::OutputTooLarge) => Err(RunnerError::OutputTooLarge {
                stream: OutputStream::Stdout,
                limit: run_config.max_output_bytes,
            }),
            Some(SimulatedFailure::Timeout) => Err(RunnerError::Timeout(run_config.timeout_seconds)),
        }
    }
}

/// Files below `dir` as sorted `/`-separated relative paths.
fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

#[async_trait]
impl ToolRunner for MockRunner {
    async fn invoke(
        &self,
        invocation: &Invocation,
        run_config: &RunConfig,
    ) -> RunnerResult<ProcessOutput> {
        self.record_call(invocation, run_config);
        self.check_failure(run_config)?;

        let response = self.next_response(invocation);
        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ProcessOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}
