//! Provider process spawner.
//!
//! Every provider command runs through the platform shell with all three
//! standard streams piped and `kill_on_drop(true)`, so a dropped handle
//! never leaks a process. On unix the child leads its own process group;
//! [`terminate`] signals the whole group so helpers spawned by the
//! provider CLI go down with it.

use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Build the shell invocation for `command`.
#[must_use]
pub fn shell_command(command: &str, cwd: &Path, env: &HashMap<String, String>) -> Command {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.process_group(0);
        cmd
    };
    #[cfg(not(unix))]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };

    cmd.current_dir(cwd)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn `command` through the shell in `cwd`.
///
/// # Errors
///
/// Returns [`AppError::Spawn`] if the shell itself cannot be started or
/// `cwd` does not exist.
pub fn spawn_shell(command: &str, cwd: &Path, env: &HashMap<String, String>) -> Result<Child> {
    let child = shell_command(command, cwd, env)
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn '{command}': {err}")))?;

    info!(
        pid = child.id().unwrap_or(0),
        command,
        cwd = %cwd.display(),
        "provider process spawned"
    );
    Ok(child)
}

/// Interrupt `child`, then force-kill it if it outlives `grace`.
///
/// Returns the exit status when one could be collected.
pub async fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    if let Ok(Some(status)) = child.try_wait() {
        return Some(status);
    }

    interrupt(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(?status, "child exited after interrupt");
            Some(status)
        }
        Ok(Err(err)) => {
            warn!(%err, "failed to wait for child after interrupt");
            None
        }
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis(),
                "child did not exit within grace period, forcing kill"
            );
            force_kill(child);
            match child.wait().await {
                Ok(status) => Some(status),
                Err(err) => {
                    warn!(%err, "failed to reap force-killed child");
                    None
                }
            }
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};

    match process_group(child) {
        Some(pgid) => {
            if let Err(err) = killpg(pgid, Signal::SIGINT) {
                debug!(%err, "SIGINT to process group failed");
            }
        }
        None => force_kill(child),
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    // No portable interrupt; go straight to termination.
    force_kill(child);
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};

    if let Some(pgid) = process_group(child) {
        if let Err(err) = killpg(pgid, Signal::SIGKILL) {
            debug!(%err, "SIGKILL to process group failed");
        }
    }
    if let Err(err) = child.start_kill() {
        debug!(%err, "start_kill failed");
    }
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "start_kill failed");
    }
}

#[cfg(unix)]
fn process_group(child: &Child) -> Option<nix::unistd::Pid> {
    let pid = child.id()?;
    i32::try_from(pid).ok().map(nix::unistd::Pid::from_raw)
}

/// Exit code of `status`, or -1 when the process was killed by a signal.
#[must_use]
pub fn exit_code(status: Option<ExitStatus>) -> i32 {
    status.as_ref().and_then(ExitStatus::code).unwrap_or(-1)
}
