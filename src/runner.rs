//! Shell command execution and runtime selection

use crate::error::{PreflightError, PreflightResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

// ============================================================================
// Trait Definitions
// ============================================================================

/// Captured result of a command that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code, `-1` if the process was terminated by a signal
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn from_output(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

/// Uniform command execution across host runtimes
///
/// A command that runs and exits is always `Ok`, whatever its exit code.
/// Only a failure to start the command at all is an `Err`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Short name of the runtime (e.g. "bash")
    fn name(&self) -> &str;

    /// Run a command, suspending until it exits
    async fn run(&self, command: &str) -> PreflightResult<CommandOutput>;

    /// Run a command, blocking the calling thread until it exits
    ///
    /// No timeout applies here, even when the runner was built with one.
    fn run_blocking(&self, command: &str) -> PreflightResult<CommandOutput>;
}

pub type SharedRunner = Arc<dyn CommandRunner>;

// ============================================================================
// Shell Implementation
// ============================================================================

/// Shells we know how to drive, in preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Sh,
    PowerShell,
    Cmd,
}

impl ShellKind {
    pub const PREFERENCE: [ShellKind; 4] = [Self::Bash, Self::Sh, Self::PowerShell, Self::Cmd];

    pub fn program(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Sh => "sh",
            Self::PowerShell => "pwsh",
            Self::Cmd => "cmd",
        }
    }

    fn command_flag(&self) -> &'static str {
        match self {
            Self::Bash | Self::Sh => "-c",
            Self::PowerShell => "-Command",
            Self::Cmd => "/C",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|kind| kind.program().eq_ignore_ascii_case(name))
    }
}

/// Runs commands through a host shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    kind: ShellKind,
    program: PathBuf,
    timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new(kind: ShellKind, program: PathBuf) -> Self {
        Self {
            kind,
            program,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> ShellKind {
        self.kind
    }

    /// Locate the shell on PATH and confirm it can run a trivial command
    pub fn probe(kind: ShellKind, path_entries: &[PathBuf]) -> Option<Self> {
        let program = resolve_on_path(kind.program(), path_entries)?;
        let runner = Self::new(kind, program);
        match runner.run_blocking("exit 0") {
            Ok(output) if output.success() => Some(runner),
            Ok(output) => {
                tracing::debug!(shell = kind.program(), exit_code = output.exit_code, "Shell probe failed");
                None
            }
            Err(e) => {
                tracing::debug!(shell = kind.program(), error = %e, "Shell probe failed");
                None
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    fn name(&self) -> &str {
        self.kind.program()
    }

    async fn run(&self, command: &str) -> PreflightResult<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(self.kind.command_flag())
            .arg(command)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(shell = self.kind.program(), command = %command, "Running command");
        execute(cmd, command, self.timeout).await
    }

    fn run_blocking(&self, command: &str) -> PreflightResult<CommandOutput> {
        let output = std::process::Command::new(&self.program)
            .arg(self.kind.command_flag())
            .arg(command)
            .stdin(std::process::Stdio::null())
            .output()
            .map_err(|source| PreflightError::Spawn {
                command: command.to_string(),
                source,
            })?;
        Ok(CommandOutput::from_output(output))
    }
}

// ============================================================================
// Direct Implementation
// ============================================================================

/// Runs commands without a shell by splitting on whitespace
///
/// No pipes, quoting or builtins. Only used when no shell is available.
#[derive(Debug, Clone, Default)]
pub struct DirectRunner {
    timeout: Option<Duration>,
}

impl DirectRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn split(command: &str) -> PreflightResult<(&str, Vec<&str>)> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| PreflightError::Spawn {
            command: command.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;
        Ok((program, parts.collect()))
    }
}

#[async_trait]
impl CommandRunner for DirectRunner {
    fn name(&self) -> &str {
        "direct"
    }

    async fn run(&self, command: &str) -> PreflightResult<CommandOutput> {
        let (program, args) = Self::split(command)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(command = %command, "Running command without shell");
        execute(cmd, command, self.timeout).await
    }

    fn run_blocking(&self, command: &str) -> PreflightResult<CommandOutput> {
        let (program, args) = Self::split(command)?;
        let output = std::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .map_err(|source| PreflightError::Spawn {
                command: command.to_string(),
                source,
            })?;
        Ok(CommandOutput::from_output(output))
    }
}

async fn execute(
    mut cmd: Command,
    command: &str,
    timeout: Option<Duration>,
) -> PreflightResult<CommandOutput> {
    let spawn_error = |source: std::io::Error| PreflightError::Spawn {
        command: command.to_string(),
        source,
    };

    let output = match timeout {
        // kill_on_drop reaps the child when the timed-out future is dropped
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| PreflightError::CommandTimeout {
                command: command.to_string(),
                timeout: limit,
            })?
            .map_err(spawn_error)?,
        None => cmd.output().await.map_err(spawn_error)?,
    };

    Ok(CommandOutput::from_output(output))
}

// ============================================================================
// Runtime Selection
// ============================================================================

/// Resolve a program by iterating over PATH entries
pub fn resolve_on_path(program: &str, path_entries: &[PathBuf]) -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(windows) { &["", ".exe"] } else { &[""] };
    path_entries.iter().find_map(|dir| {
        candidates.iter().find_map(|ext| {
            let candidate = dir.join(format!("{program}{ext}"));
            is_executable(&candidate).then_some(candidate)
        })
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Parse the PATH environment variable into directories
pub fn system_path() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default()
}

/// Select the runner for this process
///
/// With an override (`bash`, `sh`, `pwsh`, `cmd` or `direct`) only that
/// runtime is considered. Otherwise shells are probed in preference order
/// and the direct runner is the last resort.
pub fn select_runner(
    preference: Option<&str>,
    timeout: Option<Duration>,
    path_entries: &[PathBuf],
) -> PreflightResult<SharedRunner> {
    if let Some(name) = preference {
        if name.eq_ignore_ascii_case("direct") {
            return Ok(Arc::new(DirectRunner::new().with_timeout(timeout)));
        }
        let kind = ShellKind::from_name(name).ok_or_else(|| {
            PreflightError::Config(format!(
                "unknown runtime '{}' (expected bash, sh, pwsh, cmd or direct)",
                name
            ))
        })?;
        let runner = ShellRunner::probe(kind, path_entries).ok_or_else(|| {
            PreflightError::Config(format!("requested runtime '{}' is not available", name))
        })?;
        tracing::info!(runtime = kind.program(), "Using requested runtime");
        return Ok(Arc::new(runner.with_timeout(timeout)));
    }

    for kind in ShellKind::PREFERENCE {
        if let Some(runner) = ShellRunner::probe(kind, path_entries) {
            tracing::info!(runtime = kind.program(), "Selected runtime");
            return Ok(Arc::new(runner.with_timeout(timeout)));
        }
    }

    tracing::warn!("No shell found on PATH, falling back to direct execution");
    Ok(Arc::new(DirectRunner::new().with_timeout(timeout)))
}
