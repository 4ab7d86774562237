//! Change-control enforcer.
//!
//! [`reconcile`] diffs two snapshots, classifies every newly dirty path
//! against a [`Whitelist`] and reverts the disallowed ones. Revert
//! failures are collected into the report rather than returned as errors,
//! so a broken housekeeping step never loses a provider run.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::models::run::RevertFailure;
use crate::policy::whitelist::Whitelist;
use crate::snapshot::{ChangeKind, Snapshot, VersionControl};

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Paths dirty in `after` but not in `before`, sorted.
    pub changed: Vec<String>,
    /// Changed paths judged disallowed. Not a guarantee they were restored.
    pub blocked: Vec<String>,
    /// Blocked paths whose revert failed.
    pub revert_failures: Vec<RevertFailure>,
}

/// Split `changed` into allowed and blocked paths without touching the tree.
#[must_use]
pub fn classify(changed: &[String], whitelist: &Whitelist) -> (Vec<String>, Vec<String>) {
    changed
        .iter()
        .cloned()
        .partition(|path| whitelist.is_allowed(path))
}

/// Reconcile `after` against `before` and revert disallowed changes.
///
/// With an empty whitelist nothing is blocked and the tree is left alone.
/// Tracked blocked paths are restored with one batched checkout, untracked
/// ones removed with one batched clean and newly staged ones dropped from
/// the index and disk in one batch. A failing batch is retried path by
/// path so one bad path cannot shield the rest.
#[instrument(skip_all, name = "reconcile", fields(cwd = %cwd.display()))]
pub async fn reconcile(
    vcs: &dyn VersionControl,
    before: &Snapshot,
    after: &Snapshot,
    whitelist: &Whitelist,
    cwd: &Path,
) -> ReconcileReport {
    let changed = after.difference(before);
    if whitelist.is_empty() || changed.is_empty() {
        return ReconcileReport {
            changed,
            ..ReconcileReport::default()
        };
    }

    let (_, blocked) = classify(&changed, whitelist);
    if blocked.is_empty() {
        return ReconcileReport {
            changed,
            ..ReconcileReport::default()
        };
    }

    let mut tracked = Vec::new();
    let mut untracked = Vec::new();
    let mut added = Vec::new();
    for path in &blocked {
        match after.kind(path) {
            Some(ChangeKind::Untracked) => untracked.push(path.clone()),
            Some(ChangeKind::Added) => added.push(path.clone()),
            Some(ChangeKind::Tracked) | None => tracked.push(path.clone()),
        }
    }

    info!(
        cwd = %cwd.display(),
        tracked = tracked.len(),
        untracked = untracked.len(),
        added = added.len(),
        "reverting disallowed changes"
    );

    let mut revert_failures = Vec::new();
    revert_failures.extend(revert_batch(vcs, cwd, &tracked, ChangeKind::Tracked).await);
    revert_failures.extend(revert_batch(vcs, cwd, &untracked, ChangeKind::Untracked).await);
    revert_failures.extend(revert_batch(vcs, cwd, &added, ChangeKind::Added).await);

    ReconcileReport {
        changed,
        blocked,
        revert_failures,
    }
}

async fn revert_batch(
    vcs: &dyn VersionControl,
    cwd: &Path,
    paths: &[String],
    kind: ChangeKind,
) -> Vec<RevertFailure> {
    if paths.is_empty() {
        return Vec::new();
    }

    let Err(batch_err) = apply(vcs, cwd, paths, kind).await else {
        return Vec::new();
    };
    warn!(?kind, count = paths.len(), err = %batch_err, "batched revert failed, retrying per path");

    let mut failures = Vec::new();
    for path in paths {
        let single = std::slice::from_ref(path);
        if let Err(err) = apply(vcs, cwd, single, kind).await {
            warn!(path = %path, %err, "revert failed");
            failures.push(RevertFailure {
                path: path.clone(),
                reason: err.to_string(),
            });
        }
    }
    failures
}

async fn apply(
    vcs: &dyn VersionControl,
    cwd: &Path,
    paths: &[String],
    kind: ChangeKind,
) -> crate::Result<()> {
    match kind {
        ChangeKind::Tracked => vcs.checkout(cwd, paths).await,
        ChangeKind::Untracked => vcs.clean(cwd, paths).await,
        ChangeKind::Added => vcs.remove_added(cwd, paths).await,
    }
}
