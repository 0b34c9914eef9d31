//! Agent process spawning and spawn-config resolution.
//!
//! The session does not decide how to launch the agent; it asks a
//! [`SpawnResolver`] on every (re)start, because the binary, model, or
//! working directory may change between turns. The resolver returns a
//! plain [`SpawnConfig`] triple or an error, and the session treats an
//! error as a startup failure for the pending turn without retrying.
//!
//! Spawned processes get piped stdio and `kill_on_drop(true)` so a dropped
//! session cannot leak a live agent.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::config::{sanitize_binary, sanitize_working_directory, AgentConfig};
use crate::{AppError, Result};

/// Arguments forced onto every agent invocation. User-supplied duplicates
/// are filtered out of the extra args.
const FORCED_ARGS: &[&str] = &[
    "--output-format=stream-json",
    "--input-format=stream-json",
    "--verbose",
];

/// Resolved command/args/working-directory triple for one spawn attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Binary to execute.
    pub command: String,
    /// Full argument list.
    pub args: Vec<String>,
    /// Working directory for the child, when configured.
    pub cwd: Option<PathBuf>,
}

/// Call-by-call factory for spawn configurations.
///
/// Implementations are consulted immediately before each process start.
pub trait SpawnResolver: Send + Sync {
    /// Produce the spawn configuration for the next process start.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] or [`AppError::Config`] when no valid
    /// invocation can be assembled; the session reports this as a startup
    /// failure for the pending turn.
    fn resolve(&self) -> Result<SpawnConfig>;
}

/// [`SpawnResolver`] backed by an [`AgentConfig`].
///
/// Assembles `<binary> --output-format=stream-json --input-format=stream-json
/// --verbose [--model <id>] <extra args>` with the user's extra args filtered
/// to drop any output/input-format or verbosity overrides.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    agent: AgentConfig,
}

impl ConfigResolver {
    /// Create a resolver over a validated agent configuration.
    #[must_use]
    pub fn new(agent: AgentConfig) -> Self {
        Self { agent }
    }
}

impl SpawnResolver for ConfigResolver {
    fn resolve(&self) -> Result<SpawnConfig> {
        let command = sanitize_binary(&self.agent.binary).ok_or_else(|| {
            AppError::Spawn(format!("invalid agent binary {:?}", self.agent.binary))
        })?;

        let mut args: Vec<String> = FORCED_ARGS.iter().map(ToString::to_string).collect();
        if let Some(model) = self.agent.model.as_deref() {
            let model = model.trim();
            if !model.is_empty() {
                args.push("--model".to_owned());
                args.push(model.to_owned());
            }
        }
        args.extend(
            self.agent
                .extra_args
                .split_whitespace()
                .filter(|arg| {
                    !arg.starts_with("--output-format")
                        && !arg.starts_with("--input-format")
                        && *arg != "--verbose"
                })
                .map(ToString::to_string),
        );

        let cwd = match &self.agent.working_directory {
            Some(dir) => Some(sanitize_working_directory(dir).ok_or_else(|| {
                AppError::Spawn(format!(
                    "invalid working directory {}: must be absolute",
                    dir.display()
                ))
            })?),
            None => None,
        };

        Ok(SpawnConfig { command, args, cwd })
    }
}

/// Live stdio handles for a spawned agent process.
#[derive(Debug)]
pub struct AgentHandles {
    /// Child process handle, kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Agent stdin for writing outbound turn objects.
    pub stdin: ChildStdin,
    /// Raw agent stdout; the session wraps it in the NDJSON codec.
    pub stdout: ChildStdout,
}

/// Spawn the agent process described by `config` and capture its stdio.
///
/// # Errors
///
/// Returns [`AppError::Spawn`] when the OS spawn fails or a stdio handle
/// cannot be captured.
pub fn spawn_agent(config: &SpawnConfig) -> Result<AgentHandles> {
    debug!(
        command = %config.command,
        args = ?config.args,
        cwd = ?config.cwd,
        "spawning agent process"
    );

    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &config.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn agent: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdout".into()))?;

    Ok(AgentHandles {
        child,
        stdin,
        stdout,
    })
}
