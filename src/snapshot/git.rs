//! Version-control adapter.
//!
//! Enforcement only needs a handful of operations from the working tree:
//! detect a repository, list dirty paths, restore tracked paths, delete
//! untracked ones and drop newly staged ones. [`VersionControl`] captures exactly that so the enforcer can be
//! exercised against a fake, and [`GitCli`] implements it with `git`
//! subprocesses. Paths always travel as argv entries after `--`; nothing is
//! interpolated into a shell.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Parsed `git status --porcelain=v1 -z` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Two-letter XY code, or `??` for untracked.
    pub code: String,
    /// Repository-relative path, `/`-separated.
    pub path: String,
    /// True for the source path of a rename or copy record.
    pub rename_source: bool,
}

impl StatusEntry {
    /// True for files git does not track yet.
    #[must_use]
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }

    /// True for paths staged in the index but absent from `HEAD`: new
    /// files added with `git add`, and the destination of a staged rename
    /// or copy.
    #[must_use]
    pub fn is_index_added(&self) -> bool {
        match self.code.as_bytes().first() {
            Some(b'A') => true,
            Some(b'R' | b'C') => !self.rename_source,
            _ => false,
        }
    }
}

/// Working-tree operations required by the snapshot service and enforcer.
pub trait VersionControl: Send + Sync {
    /// Whether `cwd` lies inside a work tree.
    fn is_repository<'a>(
        &'a self,
        cwd: &'a Path,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// Modified, added, deleted and untracked paths under `cwd`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Snapshot`] if the status cannot be read.
    fn status<'a>(
        &'a self,
        cwd: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StatusEntry>>> + Send + 'a>>;

    /// Restore tracked `paths` to their `HEAD` content in one call.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Revert`] if any path could not be restored.
    fn checkout<'a>(
        &'a self,
        cwd: &'a Path,
        paths: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Delete untracked `paths` in one call.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Revert`] if any path could not be removed.
    fn clean<'a>(
        &'a self,
        cwd: &'a Path,
        paths: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Drop index-only `paths` from the index and delete them from disk.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Revert`] if any path could not be removed.
    fn remove_added<'a>(
        &'a self,
        cwd: &'a Path,
        paths: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// [`VersionControl`] backed by the `git` binary on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    /// Create a new adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl VersionControl for GitCli {
    fn is_repository<'a>(
        &'a self,
        cwd: &'a Path,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match run_git(cwd, &["rev-parse", "--is-inside-work-tree"]).await {
                Ok(output) => {
                    output.status.success()
                        && String::from_utf8_lossy(&output.stdout).trim() == "true"
                }
                Err(err) => {
                    debug!(cwd = %cwd.display(), %err, "git unavailable");
                    false
                }
            }
        })
    }

    fn status<'a>(
        &'a self,
        cwd: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StatusEntry>>> + Send + 'a>> {
        Box::pin(async move {
            let output = run_git(cwd, &["status", "--porcelain=v1", "-z", "-uall"])
                .await
                .map_err(|err| AppError::Snapshot(err.to_string()))?;
            if !output.status.success() {
                return Err(AppError::Snapshot(format!(
                    "git status failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            parse_status_z(&output.stdout)
        })
    }

    fn checkout<'a>(
        &'a self,
        cwd: &'a Path,
        paths: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { run_revert(cwd, &["checkout", "HEAD", "--"], paths).await })
    }

    fn clean<'a>(
        &'a self,
        cwd: &'a Path,
        paths: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { run_revert(cwd, &["clean", "-f", "--"], paths).await })
    }

    fn remove_added<'a>(
        &'a self,
        cwd: &'a Path,
        paths: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { run_revert(cwd, &["rm", "-f", "--quiet", "--"], paths).await })
    }
}

async fn run_revert(cwd: &Path, prefix: &[&str], paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let mut args: Vec<&str> = prefix.to_vec();
    args.extend(paths.iter().map(String::as_str));

    let output = run_git(cwd, &args)
        .await
        .map_err(|err| AppError::Revert(err.to_string()))?;
    if !output.status.success() {
        return Err(AppError::Revert(format!(
            "git {} failed: {}",
            prefix.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    debug!(count = paths.len(), op = prefix.first().copied().unwrap_or_default(), "revert applied");
    Ok(())
}

async fn run_git(cwd: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output()
        .await
}

/// Parse NUL-separated porcelain v1 output.
///
/// Rename and copy records are followed by a second record holding the
/// source path; both paths are reported, and only the source is marked
/// [`StatusEntry::rename_source`]. Ignored (`!!`) entries are skipped.
///
/// Paths are carried as UTF-8. A file name that is not valid UTF-8 is
/// decoded lossily and logged; git will not match the decoded name, so
/// reverting such a path fails and surfaces as a revert failure.
///
/// # Errors
///
/// Returns [`AppError::Snapshot`] on a record shorter than `XY path`.
pub fn parse_status_z(raw: &[u8]) -> Result<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    let mut records = raw.split(|b| *b == 0).filter(|r| !r.is_empty());

    while let Some(record) = records.next() {
        let (Some(code), Some(path)) = (record.get(..2), record.get(3..)) else {
            return Err(malformed(record));
        };
        if path.is_empty() {
            return Err(malformed(record));
        }
        let code = String::from_utf8_lossy(code).into_owned();
        if code == "!!" {
            continue;
        }

        let renamed = code.contains('R') || code.contains('C');
        entries.push(StatusEntry {
            code: code.clone(),
            path: decode_path(path),
            rename_source: false,
        });
        if renamed {
            if let Some(source) = records.next() {
                entries.push(StatusEntry {
                    code,
                    path: decode_path(source),
                    rename_source: true,
                });
            }
        }
    }

    Ok(entries)
}

fn decode_path(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(path) => path.to_owned(),
        Err(_) => {
            let lossy = String::from_utf8_lossy(raw).into_owned();
            warn!(path = %lossy, "path is not valid UTF-8, it cannot be reverted by name");
            lossy
        }
    }
}

fn malformed(record: &[u8]) -> AppError {
    AppError::Snapshot(format!(
        "unexpected porcelain record: '{}'",
        String::from_utf8_lossy(record)
    ))
}
