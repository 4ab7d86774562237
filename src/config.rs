//! Sandbox configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Prompt delivered to a provider when the caller supplies none.
pub const DEFAULT_PROMPT: &str = "Read the task from the ai/tasks folder and start or continue \
     the implementation using strong software engineering principles. Update necessary files \
     and documentation after completion.";

fn default_kill_grace_ms() -> u64 {
    2000
}

fn default_stdin_write_timeout_ms() -> u64 {
    5000
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_owned()
}

/// Runtime configuration parsed from `sandbox.toml`.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    /// Grace period between the interrupt signal and the forced kill.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Upper bound for delivering the initial prompt to a new session.
    #[serde(default = "default_stdin_write_timeout_ms")]
    pub stdin_write_timeout_ms: u64,
    /// One-shot run timeout; 0 means no timeout.
    #[serde(default)]
    pub run_timeout_seconds: u64,
    /// Artifact root, relative to the working directory of a run.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Prompt used when a run request carries a blank prompt.
    #[serde(default = "default_prompt")]
    pub default_prompt: String,
    /// Environment overlay applied to every provider launch.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: default_kill_grace_ms(),
            stdin_write_timeout_ms: default_stdin_write_timeout_ms(),
            run_timeout_seconds: 0,
            artifacts_dir: default_artifacts_dir(),
            default_prompt: default_prompt(),
            env: HashMap::new(),
        }
    }
}

impl SandboxConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Interrupt-to-kill grace period.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Timeout for the initial stdin write of a session.
    #[must_use]
    pub fn stdin_write_timeout(&self) -> Duration {
        Duration::from_millis(self.stdin_write_timeout_ms)
    }

    /// One-shot run timeout, if any.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_seconds > 0).then(|| Duration::from_secs(self.run_timeout_seconds))
    }

    fn validate(&self) -> Result<()> {
        if self.kill_grace_ms == 0 {
            return Err(AppError::Config(
                "kill_grace_ms must be greater than zero".into(),
            ));
        }

        if self.stdin_write_timeout_ms == 0 {
            return Err(AppError::Config(
                "stdin_write_timeout_ms must be greater than zero".into(),
            ));
        }

        let escapes = self
            .artifacts_dir
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if self.artifacts_dir.as_os_str().is_empty() || escapes {
            return Err(AppError::Config(format!(
                "artifacts_dir must be a relative path inside the working directory: {}",
                self.artifacts_dir.display()
            )));
        }

        Ok(())
    }
}
