//! Working-tree snapshots.
//!
//! A [`Snapshot`] is the set of dirty paths in a working tree at one
//! instant, each tagged with how git knows it. Two snapshots are
//! compared by set difference only; file contents are never read.

pub mod git;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use git::{GitCli, StatusEntry, VersionControl};

/// How a dirty path must be reverted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Known to git; restored with a checkout from `HEAD`.
    Tracked,
    /// Not known to git; removed with a clean.
    Untracked,
    /// Staged in the index but absent from `HEAD`; removed from both.
    Added,
}

impl ChangeKind {
    /// Precedence when one path is reported by several records.
    fn rank(self) -> u8 {
        match self {
            Self::Untracked => 0,
            Self::Added => 1,
            Self::Tracked => 2,
        }
    }
}

/// Immutable set of dirty repository-relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    paths: BTreeMap<String, ChangeKind>,
}

impl Snapshot {
    /// Snapshot with no dirty paths.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from parsed status entries.
    ///
    /// A path reported more than once keeps the tracked tag, since a
    /// checkout is the only revert that can apply to it.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = StatusEntry>) -> Self {
        let mut paths = BTreeMap::new();
        for entry in entries {
            let kind = if entry.is_untracked() {
                ChangeKind::Untracked
            } else if entry.is_index_added() {
                ChangeKind::Added
            } else {
                ChangeKind::Tracked
            };
            let path = normalize_path(&entry.path);
            if path.is_empty() {
                continue;
            }
            paths
                .entry(path)
                .and_modify(|existing: &mut ChangeKind| {
                    if kind.rank() > existing.rank() {
                        *existing = kind;
                    }
                })
                .or_insert(kind);
        }
        Self { paths }
    }

    /// Capture the dirty paths under `cwd`.
    ///
    /// Never fails: a directory outside version control, or a status
    /// command that errors, yields an empty snapshot.
    pub async fn capture(vcs: &dyn VersionControl, cwd: &Path) -> Self {
        match vcs.status(cwd).await {
            Ok(entries) => {
                let snapshot = Self::from_entries(entries);
                debug!(cwd = %cwd.display(), paths = snapshot.len(), "snapshot captured");
                snapshot
            }
            Err(err) => {
                warn!(cwd = %cwd.display(), %err, "snapshot unavailable, treating tree as clean");
                Self::empty()
            }
        }
    }

    /// Paths in `self` that are absent from `before`, sorted.
    #[must_use]
    pub fn difference(&self, before: &Self) -> Vec<String> {
        self.paths
            .keys()
            .filter(|path| !before.paths.contains_key(*path))
            .cloned()
            .collect()
    }

    /// Copy of this snapshot without `prefix` and anything beneath it.
    #[must_use]
    pub fn excluding(&self, prefix: &str) -> Self {
        let prefix = normalize_path(prefix);
        if prefix.is_empty() {
            return self.clone();
        }
        Self {
            paths: self
                .paths
                .iter()
                .filter(|(path, _)| {
                    !path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
                })
                .map(|(path, kind)| (path.clone(), *kind))
                .collect(),
        }
    }

    /// Tag of `path`, if it is dirty in this snapshot.
    #[must_use]
    pub fn kind(&self, path: &str) -> Option<ChangeKind> {
        self.paths.get(path).copied()
    }

    /// Whether `path` is dirty in this snapshot.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// Number of dirty paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when nothing is dirty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate over dirty paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }
}

impl FromIterator<(String, ChangeKind)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, ChangeKind)>>(iter: T) -> Self {
        Self {
            paths: iter
                .into_iter()
                .map(|(path, kind)| (normalize_path(&path), kind))
                .filter(|(path, _)| !path.is_empty())
                .collect(),
        }
    }
}

/// Normalize a reported path to `/`-separated, relative form.
///
/// Porcelain output quotes nothing under `-z`, so only separators, a
/// leading `./` and a trailing `/` (untracked directories) need handling.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let mut path = unified.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_end_matches('/').to_owned()
}
