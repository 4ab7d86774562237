//! Run artifact storage.
//!
//! Every orchestrated run gets its own directory
//! `<artifacts_dir>/<task key>/<UTC timestamp>/` holding the transcript
//! (`run.log`), the delivered prompt (`prompt.txt`) and the serialized
//! result (`result.json`). A run's own directory is left out of its
//! snapshots; everything else under the root is reconciled as usual.

pub mod writer;

use std::path::{Path, PathBuf};

pub use writer::ArtifactStore;

/// Transcript file name.
pub const RUN_LOG: &str = "run.log";

/// Delivered prompt file name.
pub const PROMPT_FILE: &str = "prompt.txt";

/// Serialized run result file name.
pub const RESULT_FILE: &str = "result.json";

/// Directory allocated for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    absolute: PathBuf,
    relative: PathBuf,
}

impl RunArtifacts {
    /// Absolute location on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.absolute
    }

    /// Location relative to the working directory of the run.
    #[must_use]
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Absolute path of `name` inside this directory.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.absolute.join(name)
    }
}
