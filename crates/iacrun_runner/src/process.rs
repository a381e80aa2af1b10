//! Child-process runner backed by `tokio::process`.
//!
//! The executable is spawned directly with a discrete argument vector. The
//! child's environment is cleared and replaced with the invocation's map, so
//! nothing leaks in from the server process unless the caller put it there.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

use crate::config::{Invocation, RunConfig};
use crate::error::{OutputStream, RunnerError, RunnerResult};
use crate::runner::{ProcessOutput, ToolRunner};

/// Runs invocations as local child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.executable);
        cmd.args(&invocation.args)
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &invocation.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn collect(
        child: &mut Child,
        run_config: &RunConfig,
    ) -> RunnerResult<(i32, String, String)> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

        let limit = run_config.max_output_bytes;
        let (stdout, stderr) = tokio::try_join!(
            read_capped(stdout, limit, OutputStream::Stdout),
            read_capped(stderr, limit, OutputStream::Stderr),
        )?;
        let status = child.wait().await?;

        Ok((
            status.code().unwrap_or(-1),
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }
}

/// Read a stream to EOF, failing once more than `limit` bytes arrive.
async fn read_capped<R>(reader: R, limit: usize, stream: OutputStream) -> RunnerResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > limit {
        return Err(RunnerError::OutputTooLarge { stream, limit });
    }
    Ok(buf)
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!("Failed to kill child process: {}", e);
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn invoke(
        &self,
        invocation: &Invocation,
        run_config: &RunConfig,
    ) -> RunnerResult<ProcessOutput> {
        let cmd_str = invocation.display_command();
        debug!("Executing: {}", cmd_str);

        let mut child = Self::build_command(invocation)
            .spawn()
            .map_err(|source| RunnerError::SpawnFailed {
                executable: invocation.executable.clone(),
                source,
            })?;

        let started_at = Utc::now();
        let clock = Instant::now();

        let collected = match run_config.timeout_duration() {
            Some(limit) => {
                match tokio::time::timeout(limit, Self::collect(&mut child, run_config)).await {
                    Ok(result) => result,
                    Err(_) => Err(RunnerError::Timeout(run_config.timeout_seconds)),
                }
            }
            None => Self::collect(&mut child, run_config).await,
        };

        let (exit_code, stdout, stderr) = match collected {
            Ok(collected) => collected,
            Err(e) => {
                error!("Invocation failed: {}: {}", cmd_str, e);
                reap(&mut child).await;
                return Err(e);
            }
        };

        let finished_at = Utc::now();
        let duration_ms = clock.elapsed().as_millis() as u64;

        if exit_code == 0 {
            info!("{} completed successfully in {}ms", invocation.executable, duration_ms);
        } else {
            info!(
                "{} exited with code {} after {}ms",
                invocation.executable, exit_code, duration_ms
            );
        }

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("/bin/sh")
            .args(["-c", script])
            .env("PATH", std::env::var("PATH").unwrap_or_default())
    }

    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        let runner = ProcessRunner::new();
        let output = runner
            .invoke(&sh("echo out; echo err >&2; exit 3"), &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_output_limit_is_fatal() {
        let runner = ProcessRunner::new();
        let result = runner
            .invoke(
                &sh("head -c 4096 /dev/zero"),
                &RunConfig::default().max_output(1024),
            )
            .await;

        assert!(matches!(
            result,
            Err(RunnerError::OutputTooLarge {
                stream: OutputStream::Stdout,
                limit: 1024
            })
        ));
    }

    #[tokio::test]
    async fn test_output_at_limit_is_accepted() {
        let runner = ProcessRunner::new();
        let output = runner
            .invoke(&sh("printf abcd"), &RunConfig::default().max_output(4))
            .await
            .unwrap();
        assert_eq!(output.stdout, "abcd");
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let result = runner
            .invoke(&sh("sleep 30"), &RunConfig::default().timeout(1))
            .await;

        assert!(matches!(result, Err(RunnerError::Timeout(1))));
        assert!(started.elapsed().as_secs() < 30);
    }

    #[tokio::test]
    async fn test_environment_is_explicit() {
        let runner = ProcessRunner::new();
        let output = runner
            .invoke(
                &sh("printf '%s|%s' \"$TF_IN_AUTOMATION\" \"${HOME:-unset}\"")
                    .env("TF_IN_AUTOMATION", "1"),
                &RunConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "1|unset");
    }

    #[tokio::test]
    async fn test_workdir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.tf"), "").unwrap();

        let runner = ProcessRunner::new();
        let output = runner
            .invoke(&sh("ls").workdir(dir.path()), &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "main.tf");
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_failure() {
        let runner = ProcessRunner::new();
        let result = runner
            .invoke(
                &Invocation::new("iacrun-definitely-not-installed"),
                &RunConfig::default(),
            )
            .await;

        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
    }
}
