//! Error types shared across the sandbox.

use std::fmt::{Display, Formatter};

/// Shared sandbox result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Sandbox error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Provider executable could not be launched through the shell.
    Spawn(String),
    /// Write or kill addressed a session that is unknown or has exited.
    SessionNotFound(String),
    /// Working tree status could not be read (not under version control).
    Snapshot(String),
    /// A disallowed path could not be restored.
    Revert(String),
    /// Artifact directory or file could not be written.
    Artifact(String),
    /// File-system or pipe I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::SessionNotFound(msg) => write!(f, "session not found: {msg}"),
            Self::Snapshot(msg) => write!(f, "snapshot: {msg}"),
            Self::Revert(msg) => write!(f, "revert: {msg}"),
            Self::Artifact(msg) => write!(f, "artifact: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
