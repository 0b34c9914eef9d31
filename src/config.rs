//! Global configuration parsing, validation, and defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Agent CLI configuration: which binary to run and how to invoke it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary name or absolute path.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Extra arguments appended after the forced stream-json flags.
    ///
    /// Split on whitespace. Any `--output-format`/`--input-format`/`--verbose`
    /// entries are dropped because the session forces its own.
    #[serde(default)]
    pub extra_args: String,
    /// Model identifier forwarded as `--model <id>`; omitted when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Working directory for the agent process. Must be absolute when set.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

fn default_binary() -> String {
    "claude".to_owned()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            extra_args: String::new(),
            model: None,
            working_directory: None,
        }
    }
}

/// Conversation-shaping configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChatConfig {
    /// Maximum number of dialogue messages included in an assembled prompt.
    #[serde(default = "default_max_history")]
    pub max_history_messages: usize,
    /// Collapse individual tool-call records into one running summary.
    #[serde(default)]
    pub compact_tool_calls: bool,
}

fn default_max_history() -> usize {
    6
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history(),
            compact_tool_calls: false,
        }
    }
}

/// Configurable timeout values (seconds) for streaming turns.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Inactivity threshold for an in-flight turn. Values below 5 seconds
    /// disable the timer entirely.
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: u64,
}

fn default_idle_seconds() -> u64 {
    45
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            idle_seconds: default_idle_seconds(),
        }
    }
}

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Agent CLI invocation settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Conversation-shaping settings.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Timeout settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl GlobalConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the file cannot be read, is not
    /// valid TOML, or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the agent binary name contains
    /// unsafe characters or the working directory is not a clean absolute
    /// path.
    pub fn validate(&self) -> Result<()> {
        if sanitize_binary(&self.agent.binary).is_none() {
            return Err(AppError::Config(format!(
                "invalid agent binary {:?}: expected a bare name or an absolute path \
                 of [A-Za-z0-9._/-] characters",
                self.agent.binary
            )));
        }
        if let Some(dir) = &self.agent.working_directory {
            if sanitize_working_directory(dir).is_none() {
                return Err(AppError::Config(format!(
                    "invalid working directory {}: must be absolute and must not \
                     contain `..` components",
                    dir.display()
                )));
            }
        }
        if self.chat.max_history_messages == 0 {
            return Err(AppError::Config(
                "chat.max_history_messages must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Accept a binary value if it is a bare command name or an absolute path
/// built from safe characters; return the trimmed value, or `None`.
#[must_use]
pub fn sanitize_binary(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let safe = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'));
    if !safe {
        return None;
    }
    if trimmed.contains('/') && !Path::new(trimmed).is_absolute() {
        return None;
    }
    Some(trimmed.to_owned())
}

/// Accept a working directory only when it is absolute and free of `..`
/// components; return the path, or `None`.
#[must_use]
pub fn sanitize_working_directory(dir: &Path) -> Option<PathBuf> {
    if !dir.is_absolute() {
        return None;
    }
    if dir
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return None;
    }
    Some(dir.to_path_buf())
}
