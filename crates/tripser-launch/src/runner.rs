//! Running build targets and submitting batch scripts on the host.

use crate::error::{LaunchError, Result};
use crate::targets::BuildPlan;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

/// Output line from a target command.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub target: String,
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub name: String,
    pub commands: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub targets: Vec<TargetOutcome>,
    pub duration_ms: u64,
}

/// Runs build targets through `sh -c` in a workspace directory.
pub struct TargetRunner {
    workspace: PathBuf,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl TargetRunner {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            env: HashMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Kill a command that runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// The `(target, command)` pairs `run` would execute, in order.
    pub fn dry_run(&self, plan: &BuildPlan, target: &str) -> Result<Vec<(String, String)>> {
        plan.validate()?;
        plan.commands(target)
    }

    /// Run `target` and its prerequisites. Stops at the first command
    /// that exits non-zero.
    ///
    /// Output lines are sent to `output_tx`, which the caller must drain
    /// while the run is in progress.
    pub async fn run(
        &self,
        plan: &BuildPlan,
        target: &str,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<RunSummary> {
        plan.validate()?;
        let start = Instant::now();
        let mut summary = RunSummary::default();

        for resolved in plan.resolve(target)? {
            let target_start = Instant::now();
            info!(make_target = %resolved.name, commands = resolved.commands.len(), "Running target");

            for command in &resolved.commands {
                let command = plan.expand(command)?;
                let exit_code = self
                    .execute_command(&resolved.name, &command, output_tx.clone())
                    .await?;
                if exit_code != 0 {
                    return Err(LaunchError::CommandFailed {
                        target: resolved.name.clone(),
                        command,
                        exit_code,
                    });
                }
            }

            summary.targets.push(TargetOutcome {
                name: resolved.name.clone(),
                commands: resolved.commands.len(),
                duration_ms: target_start.elapsed().as_millis() as u64,
            });
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    async fn execute_command(
        &self,
        target: &str,
        command: &str,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<i32> {
        let start = Instant::now();
        info!(make_target = target, command, workspace = %self.workspace.display(), "Executing command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not captured"))?;

        let stdout_handle = tokio::spawn(forward_lines(
            stdout,
            target.to_string(),
            OutputStream::Stdout,
            output_tx.clone(),
        ));
        let stderr_handle = tokio::spawn(forward_lines(
            stderr,
            target.to_string(),
            OutputStream::Stderr,
            output_tx,
        ));

        let status = match self.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(make_target = target, command, timeout_secs = limit.as_secs(), "Command timed out, killing process");
                    child.kill().await?;
                    return Err(LaunchError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{} timed out", command),
                    )));
                }
            },
            None => child.wait().await?,
        };

        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        let exit_code = status.code().unwrap_or(-1);
        debug!(make_target = target, exit_code, duration_ms = start.elapsed().as_millis() as u64, "Command completed");
        Ok(exit_code)
    }
}

/// Send every line of `reader` to `tx`. Keeps draining the pipe after the
/// receiver is gone so the child never blocks on a full pipe.
async fn forward_lines<R>(reader: R, target: String, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_number = 0u32;
    let mut receiver_alive = true;

    while let Ok(Some(content)) = lines.next_line().await {
        line_number += 1;
        if !receiver_alive {
            continue;
        }
        let line = OutputLine {
            target: target.clone(),
            stream,
            content,
            line_number,
            timestamp: chrono::Utc::now(),
        };
        if tx.send(line).await.is_err() {
            receiver_alive = false;
        }
    }
}

/// Hands batch scripts to the SLURM scheduler.
pub struct BatchSubmitter {
    program: String,
}

impl BatchSubmitter {
    pub fn new() -> Self {
        Self {
            program: "sbatch".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Submit `script`; returns the job id the scheduler reports.
    pub async fn submit(&self, script: &Path) -> Result<String> {
        info!(program = %self.program, script = %script.display(), "Submitting batch job");

        let output = Command::new(&self.program).arg(script).output().await?;
        if !output.status.success() {
            return Err(LaunchError::SubmitFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_job_id(&stdout).unwrap_or_else(|| stdout.trim().to_string()))
    }
}

impl Default for BatchSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_job_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .map(|id| id.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id() {
        assert_eq!(parse_job_id("Submitted batch job 4711\n"), Some("4711".to_string()));
        assert_eq!(parse_job_id("sbatch: error"), None);
    }

    #[test]
    fn test_dry_run_lists_expanded_commands_in_order() {
        let runner = TargetRunner::new(".");
        let commands = runner.dry_run(&BuildPlan::default(), "test").unwrap();
        let targets: Vec<&str> = commands.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(targets, vec!["format", "lint", "unittest"]);
        assert_eq!(commands[0].1, "cargo fmt --all");
    }
}
