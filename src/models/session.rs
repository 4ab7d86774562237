//! Session identifiers and lifecycle records.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a live child process in a registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("p_{}", Uuid::new_v4().simple()))
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Snapshot of a registered session for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: SessionId,
    /// OS process id, if the platform reported one.
    pub pid: Option<u32>,
    /// Shell command the session was started with.
    pub command: String,
    /// Spawn time.
    pub started_at: DateTime<Utc>,
}

/// How a session's process ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitInfo {
    /// Session that exited.
    pub session_id: SessionId,
    /// Process exit code; `None` when terminated by a signal or unknown.
    pub exit_code: Option<i32>,
    /// Whether the exit was caused by an explicit kill.
    pub killed: bool,
    /// Human-readable reason.
    pub reason: String,
}

impl ExitInfo {
    /// True when the process exited on its own with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.killed && self.exit_code == Some(0)
    }
}
