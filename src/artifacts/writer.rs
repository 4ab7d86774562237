//! Filesystem-backed artifact store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use super::RunArtifacts;
use crate::{AppError, Result};

/// Attempts at a unique run directory before giving up.
const MAX_COLLISION_SUFFIX: u32 = 100;

/// Creates run directories and writes artifact files under a root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    workdir: PathBuf,
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `workdir/artifacts_dir`.
    ///
    /// `artifacts_dir` is expected to be relative; it is reported back in
    /// that form through [`RunArtifacts::relative`].
    #[must_use]
    pub fn new(workdir: &Path, artifacts_dir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            root: artifacts_dir.to_path_buf(),
        }
    }

    /// Allocate a fresh run directory for `task_key` stamped with `now`.
    ///
    /// Two runs started within the same millisecond get `-1`, `-2`, ...
    /// suffixes rather than sharing a directory.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Artifact`] if the directory cannot be created.
    pub async fn create_run_dir(&self, task_key: &str, now: DateTime<Utc>) -> Result<RunArtifacts> {
        let parent_rel = self.root.join(task_key);
        let parent = self.workdir.join(&parent_rel);
        fs::create_dir_all(&parent).await.map_err(|err| {
            AppError::Artifact(format!("failed to create {}: {err}", parent.display()))
        })?;

        let stamp = timestamp_dir_name(now);
        for attempt in 0..=MAX_COLLISION_SUFFIX {
            let name = if attempt == 0 {
                stamp.clone()
            } else {
                format!("{stamp}-{attempt}")
            };
            let absolute = parent.join(&name);
            match fs::create_dir(&absolute).await {
                Ok(()) => {
                    debug!(path = %absolute.display(), "run artifact directory created");
                    return Ok(RunArtifacts {
                        absolute,
                        relative: parent_rel.join(name),
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => {
                    return Err(AppError::Artifact(format!(
                        "failed to create {}: {err}",
                        absolute.display()
                    )));
                }
            }
        }

        Err(AppError::Artifact(format!(
            "no free run directory for {stamp} under {}",
            parent.display()
        )))
    }

    /// Write `content` to `name` inside `run`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Artifact`] if the file cannot be written.
    pub async fn write_file(&self, run: &RunArtifacts, name: &str, content: &str) -> Result<()> {
        let path = run.file(name);
        fs::write(&path, content)
            .await
            .map_err(|err| AppError::Artifact(format!("failed to write {}: {err}", path.display())))
    }

    /// Serialize `value` as pretty JSON into `name` inside `run`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Artifact`] if serialization or the write fails.
    pub async fn write_json<T: Serialize + Sync>(
        &self,
        run: &RunArtifacts,
        name: &str,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| AppError::Artifact(format!("failed to serialize {name}: {err}")))?;
        self.write_file(run, name, &json).await
    }
}

/// Directory name for a run started at `now`: ISO-8601 UTC with `:`
/// replaced by `-`, e.g. `2024-05-01T12-30-05.123Z`.
#[must_use]
pub fn timestamp_dir_name(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace(':', "-")
}
