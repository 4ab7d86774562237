//! Output event model for streamed process output.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::session::SessionId;

/// Which pipe a chunk of output was read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Child standard output.
    Stdout,
    /// Child standard error.
    Stderr,
}

impl Display for StreamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// One sanitized chunk of process output.
///
/// Chunks from the same stream arrive in read order; stdout and stderr are
/// not ordered relative to each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputEvent {
    /// Owning session, absent for one-shot runs.
    pub session_id: Option<SessionId>,
    /// Source pipe.
    pub stream: StreamKind,
    /// Sanitized text.
    pub data: String,
    /// Time the chunk was read.
    pub timestamp: DateTime<Utc>,
}

impl OutputEvent {
    /// Construct an event stamped with the current time.
    #[must_use]
    pub fn new(session_id: Option<SessionId>, stream: StreamKind, data: String) -> Self {
        Self {
            session_id,
            stream,
            data,
            timestamp: Utc::now(),
        }
    }
}
