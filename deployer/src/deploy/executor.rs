//! Two-phase compose executor: pull, then start

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::DeployerError;

/// A compose invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pull,
    Start,
}

impl Phase {
    /// Arguments following `-f <descriptor>`
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            Phase::Pull => &["pull"],
            Phase::Start => &["up", "-d", "--remove-orphans"],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pull => write!(f, "Pull"),
            Phase::Start => write!(f, "Start"),
        }
    }
}

/// Result of the last phase that ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub phase: Phase,
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,

    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

/// The compose program and its leading arguments, e.g. `docker compose`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ComposeCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace. No quoting is supported.
    pub fn parse(command: &str) -> Result<Self, DeployerError> {
        let mut words = command.split_whitespace().map(String::from);
        let program = words
            .next()
            .ok_or_else(|| DeployerError::ConfigError("compose command is empty".to_string()))?;
        Ok(Self::new(program, words.collect()))
    }
}

impl Default for ComposeCommand {
    fn default() -> Self {
        Self::new("docker", vec!["compose".to_string()])
    }
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs compose against a descriptor
#[derive(Debug, Clone, Default)]
pub struct ComposeExecutor {
    command: ComposeCommand,
}

impl ComposeExecutor {
    pub fn new(command: ComposeCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &ComposeCommand {
        &self.command
    }

    /// Pull then start. A failed pull is returned as the outcome and the
    /// start phase never runs. Each phase is bounded by `phase_timeout`.
    pub async fn execute(
        &self,
        descriptor: &Path,
        working_dir: &Path,
        phase_timeout: Duration,
    ) -> Result<DeploymentOutcome, DeployerError> {
        let pulled = self
            .run_phase(Phase::Pull, descriptor, working_dir, phase_timeout)
            .await?;
        if !pulled.succeeded {
            return Ok(pulled);
        }
        self.run_phase(Phase::Start, descriptor, working_dir, phase_timeout)
            .await
    }

    /// Run one phase. The child is killed if the timeout elapses or the
    /// returned future is dropped.
    pub async fn run_phase(
        &self,
        phase: Phase,
        descriptor: &Path,
        working_dir: &Path,
        phase_timeout: Duration,
    ) -> Result<DeploymentOutcome, DeployerError> {
        debug!(
            %phase,
            command = %self.command,
            descriptor = %descriptor.display(),
            "Running compose phase"
        );

        let child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg("-f")
            .arg(descriptor)
            .args(phase.args())
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeployerError::ExecutionError {
                phase,
                message: format!("failed to spawn `{}`: {}", self.command, e),
            })?;

        let output = match timeout(phase_timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| DeployerError::ExecutionError {
                phase,
                message: format!("failed to collect output: {e}"),
            })?,
            Err(_) => {
                warn!(%phase, timeout = ?phase_timeout, "Compose phase timed out");
                return Err(DeployerError::Timeout {
                    phase,
                    timeout: phase_timeout,
                });
            }
        };

        let outcome = DeploymentOutcome {
            phase,
            succeeded: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        if outcome.succeeded {
            info!(%phase, "Compose phase succeeded");
        } else {
            warn!(%phase, exit_code = ?outcome.exit_code, "Compose phase failed");
        }
        Ok(outcome)
    }
}
