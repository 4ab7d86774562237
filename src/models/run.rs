//! Run request/result models for orchestrated provider executions.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder key used when a run is not tied to a task.
pub const NO_TASK_KEY: &str = "NO-TASK";

/// Reference to a task, e.g. `FEAT-0001/PR1`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TaskRef(String);

impl TaskRef {
    /// Wrap a raw task reference.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw reference text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `/`-separated segment, if it is a safe directory name.
    ///
    /// Returns `None` for empty keys and keys that could escape their parent
    /// directory (`.`, `..`, backslashes, drive prefixes, control characters).
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        let key = self.0.trim().split('/').next().unwrap_or_default().trim();
        let unsafe_char = |c: char| c == '\\' || c == ':' || c.is_control();
        if key.is_empty() || key == "." || key == ".." || key.chars().any(unsafe_char) {
            None
        } else {
            Some(key)
        }
    }

    /// Directory name used for artifacts of this task.
    #[must_use]
    pub fn artifact_key(&self) -> &str {
        self.key().unwrap_or(NO_TASK_KEY)
    }
}

impl From<&str> for TaskRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Parameters of one orchestrated provider run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Task the run belongs to; selects whitelist and artifact folder.
    pub task_ref: TaskRef,
    /// Provider key; `None` selects the registry default.
    pub provider: Option<String>,
    /// Prompt delivered over stdin; blank selects the configured default.
    pub prompt: Option<String>,
    /// Skip change-control enforcement.
    pub dry_run: bool,
    /// Environment overlay for the provider process.
    pub env: HashMap<String, String>,
}

/// Parameters of an interactive provider session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractiveRequest {
    /// Provider key; `None` selects the registry default.
    pub provider: Option<String>,
    /// Initial prompt; blank selects the configured default.
    pub prompt: Option<String>,
    /// Environment overlay for the provider process.
    pub env: HashMap<String, String>,
}

/// Lifecycle of a single orchestrated run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Resolved but not yet launched.
    Pending,
    /// Provider process is executing.
    Running,
    /// Provider exited with status 0.
    Completed,
    /// Provider failed to spawn, exited non-zero or timed out.
    Failed,
}

impl RunState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Completed | Self::Failed)
        )
    }
}

/// A blocked path that could not be restored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevertFailure {
    /// Repository-relative path.
    pub path: String,
    /// Version-control error text.
    pub reason: String,
}

/// Result of one orchestrated run; produced exactly once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunResult {
    /// Provider exited with status 0.
    pub ok: bool,
    /// Provider key that was chosen.
    pub provider: String,
    /// Artifact directory, relative to the working directory.
    pub artifacts_dir: PathBuf,
    /// Paths that became dirty during the run.
    pub changed: Vec<String>,
    /// Changed paths judged disallowed by the whitelist.
    pub blocked: Vec<String>,
    /// Blocked paths whose revert failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revert_failures: Vec<RevertFailure>,
    /// Provider exit code, -1 when unavailable.
    pub exit_code: i32,
}

impl RunResult {
    /// Terminal state of the run.
    #[must_use]
    pub fn state(&self) -> RunState {
        if self.ok {
            RunState::Completed
        } else {
            RunState::Failed
        }
    }
}

/// Structured result of a one-shot process run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit status was 0.
    pub ok: bool,
    /// Accumulated sanitized stdout.
    pub stdout: String,
    /// Accumulated sanitized stderr plus any error text.
    pub stderr: String,
    /// Exit code, -1 when unavailable.
    pub exit_code: i32,
    /// The run exceeded its timeout and was terminated.
    pub timed_out: bool,
}

impl ProcessOutcome {
    /// Outcome for a process that never started.
    #[must_use]
    pub fn spawn_failed(reason: String) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: reason,
            exit_code: -1,
            timed_out: false,
        }
    }
}
