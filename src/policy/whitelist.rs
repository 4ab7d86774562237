//! Task whitelist loader and prefix matcher.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::models::run::TaskRef;

/// Directory, relative to a working directory, holding per-task folders.
const TASKS_DIR: &str = "ai/tasks";

/// File name of a task whitelist.
const WHITELIST_FILE: &str = "whitelist.txt";

/// Ordered list of path prefixes a run may modify.
///
/// An empty whitelist places no restriction on the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    /// Build a whitelist from raw entries, normalizing each one.
    #[must_use]
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .filter_map(|e| normalize_entry(e.as_ref()))
                .collect(),
        }
    }

    /// Parse whitelist file content: one entry per line, blank lines and
    /// `#` comments ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.lines())
    }

    /// Path of the whitelist for `task`, if the task key is usable.
    #[must_use]
    pub fn path_for(workdir: &Path, task: &TaskRef) -> Option<PathBuf> {
        task.key()
            .map(|key| workdir.join(TASKS_DIR).join(key).join(WHITELIST_FILE))
    }

    /// Load the whitelist of `task` from `workdir`.
    ///
    /// A missing file, or a run without a task, yields an empty whitelist.
    /// An unreadable file also yields an empty whitelist and logs a warning.
    #[must_use]
    pub fn load(workdir: &Path, task: &TaskRef) -> Self {
        let Some(path) = Self::path_for(workdir, task) else {
            debug!(task = task.as_str(), "no task key, whitelist is empty");
            return Self::default();
        };

        if !path.exists() {
            debug!(path = %path.display(), "no whitelist file, all changes allowed");
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(raw) => {
                let whitelist = Self::parse(&raw);
                debug!(path = %path.display(), entries = whitelist.len(), "whitelist loaded");
                whitelist
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    %err,
                    "failed to read whitelist, all changes allowed"
                );
                Self::default()
            }
        }
    }

    /// Whether `path` equals an entry or lies under one as a directory.
    ///
    /// Always true for an empty whitelist. Matching respects separator
    /// boundaries: `src` allows `src/a.ts` but not `src-backup/a.ts`.
    #[must_use]
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.entries.iter().any(|entry| {
            path.strip_prefix(entry.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Normalized entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the whitelist places no restriction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_entry(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let unified = line.replace('\\', "/");
    let mut entry = unified.as_str();
    while let Some(rest) = entry.strip_prefix("./") {
        entry = rest;
    }
    let entry = entry.trim_end_matches('/');

    // "." or "./" would otherwise normalize to the empty prefix.
    if entry.is_empty() || entry == "." {
        return None;
    }
    Some(entry.to_owned())
}
