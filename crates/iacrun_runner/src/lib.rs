//! # iacrun_runner
//!
//! Subprocess execution layer for iacrun.
//!
//! Every external tool invocation goes through the [`ToolRunner`] trait. The
//! production implementation spawns the executable directly (no shell), with
//! an explicit working directory and an explicit environment, and caps the
//! amount of output it is willing to buffer.
//!
//! # Features
//!
//! - **Discrete arguments**: arguments are passed as a vector, never through a shell
//! - **Bounded capture**: stdout and stderr are capped per stream
//! - **Exit codes as values**: a non-zero exit is a [`ProcessOutput`], not an error
//! - **No orphans**: children are killed when the invocation is dropped or times out
//! - **Mock Runner**: scripted responses for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use iacrun_runner::{Invocation, ProcessRunner, RunConfig, ToolRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::new();
//!
//!     let invocation = Invocation::new("terraform")
//!         .args(["fmt", "-check", "-no-color"])
//!         .workdir("/tmp/tf-example");
//!
//!     let output = runner.invoke(&invocation, &RunConfig::default()).await?;
//!     println!("Exit code: {}", output.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::{Invocation, RunConfig, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECONDS};
pub use error::{OutputStream, RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::ProcessRunner;
pub use runner::{ProcessOutput, ToolRunner};
