//! Live process session registry.
//!
//! The registry is the single owner of the session map. Each started
//! session gets a monitor task that waits for the child to exit (or for a
//! kill request), removes the entry and publishes an [`ExitInfo`]. Output
//! flows through per-session channels; the registry never buffers it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures_util::Stream;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::config::SandboxConfig;
use crate::models::output::{OutputEvent, StreamKind};
use crate::models::run::ProcessOutcome;
use crate::models::session::{ExitInfo, SessionId, SessionInfo};
use crate::orchestrator::spawner::{exit_code, spawn_shell, terminate};
use crate::output::reader::pump_output;
use crate::{AppError, Result};

/// Timing knobs for process control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSettings {
    /// Interrupt-to-kill grace period.
    pub kill_grace: Duration,
    /// Upper bound for the initial stdin write.
    pub stdin_write_timeout: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

impl From<&SandboxConfig> for ProcessSettings {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            kill_grace: config.kill_grace(),
            stdin_write_timeout: config.stdin_write_timeout(),
        }
    }
}

/// Parameters for a registered session.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    /// Shell command line.
    pub command: String,
    /// Working directory of the child.
    pub cwd: PathBuf,
    /// Environment overlay.
    pub env: HashMap<String, String>,
    /// Text written to stdin before the session becomes visible.
    pub initial_input: Option<String>,
}

/// Parameters for an unregistered one-shot process.
#[derive(Debug, Clone, Default)]
pub struct RunOnceRequest {
    /// Shell command line.
    pub command: String,
    /// Working directory of the child.
    pub cwd: PathBuf,
    /// Environment overlay.
    pub env: HashMap<String, String>,
    /// Text written to stdin before it is closed.
    pub input: Option<String>,
    /// Terminate the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

/// Handle returned by [`SessionRegistry::start`].
#[derive(Debug)]
pub struct StartedSession {
    /// Registry key of the session.
    pub id: SessionId,
    /// Sanitized output of the session.
    pub output: OutputStream,
    /// Resolves when the process has exited and been deregistered.
    pub exit: ExitWatch,
    /// Non-fatal errors from delivering the initial input.
    pub startup_errors: Vec<String>,
}

/// Stream of sanitized output events; ends once both pipes close.
///
/// Dropping the stream unsubscribes without affecting the process.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<OutputEvent>,
}

impl OutputStream {
    /// Next event, or `None` once the process has closed its pipes.
    pub async fn recv(&mut self) -> Option<OutputEvent> {
        self.rx.recv().await
    }
}

impl Stream for OutputStream {
    type Item = OutputEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Exit notification for a session.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ExitInfo>>,
}

impl ExitWatch {
    /// Wait until the session has exited.
    ///
    /// Returns `None` only if the monitor task was lost without reporting.
    pub async fn wait(&mut self) -> Option<ExitInfo> {
        if self.rx.wait_for(Option::is_some).await.is_err() {
            debug!("session monitor dropped before reporting exit");
        }
        self.rx.borrow().clone()
    }

    /// Exit info if the session has already exited.
    #[must_use]
    pub fn current(&self) -> Option<ExitInfo> {
        self.rx.borrow().clone()
    }
}

struct SessionEntry {
    info: SessionInfo,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    kill: CancellationToken,
    exited: watch::Receiver<Option<ExitInfo>>,
}

type SessionMap = Arc<Mutex<HashMap<SessionId, SessionEntry>>>;

/// Registry of live provider sessions.
///
/// Cloning is cheap; clones share the same session map.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: SessionMap,
    settings: ProcessSettings,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(ProcessSettings::default())
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(settings: ProcessSettings) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    /// Timing knobs this registry was built with.
    #[must_use]
    pub fn settings(&self) -> ProcessSettings {
        self.settings
    }

    /// Spawn a session and register it.
    ///
    /// The initial input is written before the session is inserted into
    /// the map, so no caller [`write`](Self::write) can overtake it. A
    /// failed or timed-out initial write is reported in
    /// [`StartedSession::startup_errors`] and the session stays alive.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] if the process could not be launched.
    #[instrument(skip_all, name = "start_session", fields(command = %request.command))]
    pub async fn start(&self, request: SpawnRequest) -> Result<StartedSession> {
        let SpawnRequest {
            command,
            cwd,
            env,
            initial_input,
        } = request;

        let id = SessionId::generate();
        let mut child = spawn_shell(&command, &cwd, &env)?;
        let pid = child.id();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        spawn_readers(&mut child, Some(&id), &event_tx);
        drop(event_tx);

        let mut stdin = child.stdin.take();
        let mut startup_errors = Vec::new();
        if let Some(input) = initial_input.as_deref() {
            let delivered = match stdin.as_mut() {
                Some(pipe) => write_with_timeout(pipe, input, self.settings.stdin_write_timeout).await,
                None => Err(AppError::Io("stdin is not available".into())),
            };
            if let Err(err) = delivered {
                warn!(session_id = %id, %err, "initial input not delivered");
                startup_errors.push(err.to_string());
            }
        }

        let kill = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(None);
        let info = SessionInfo {
            id: id.clone(),
            pid,
            command,
            started_at: Utc::now(),
        };

        self.sessions.lock().await.insert(
            id.clone(),
            SessionEntry {
                info,
                stdin: Arc::new(Mutex::new(stdin)),
                kill: kill.clone(),
                exited: exit_rx.clone(),
            },
        );
        info!(session_id = %id, pid = pid.unwrap_or(0), "session registered");

        let span = info_span!("session", session_id = %id);
        tokio::spawn(
            monitor_session(
                Arc::clone(&self.sessions),
                id.clone(),
                child,
                kill,
                exit_tx,
                self.settings.kill_grace,
            )
            .instrument(span),
        );

        Ok(StartedSession {
            id,
            output: OutputStream { rx: event_rx },
            exit: ExitWatch { rx: exit_rx },
            startup_errors,
        })
    }

    /// Write `text` to the stdin of session `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionNotFound`] if the session is unknown or
    /// has exited, or [`AppError::Io`] if the pipe write fails otherwise.
    pub async fn write(&self, id: &SessionId, text: &str) -> Result<()> {
        let stdin = {
            let sessions = self.sessions.lock().await;
            let entry = sessions
                .get(id)
                .filter(|entry| entry.exited.borrow().is_none())
                .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
            Arc::clone(&entry.stdin)
        };

        let mut guard = stdin.lock().await;
        let pipe = guard
            .as_mut()
            .ok_or_else(|| AppError::SessionNotFound(format!("{id}: stdin closed")))?;

        let written = async {
            pipe.write_all(text.as_bytes()).await?;
            pipe.flush().await
        }
        .await;

        written.map_err(|err| {
            if err.kind() == std::io::ErrorKind::BrokenPipe {
                AppError::SessionNotFound(format!("{id}: process has exited"))
            } else {
                AppError::Io(format!("write to {id} failed: {err}"))
            }
        })
    }

    /// Interrupt session `id`, force-killing it after the grace period.
    ///
    /// Waits until the process is gone and deregistered. Killing an
    /// unknown or already-exited session succeeds.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` mirrors [`write`](Self::write).
    pub async fn kill(&self, id: &SessionId) -> Result<()> {
        let handle = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(id)
                .map(|entry| (entry.kill.clone(), entry.exited.clone()))
        };

        let Some((kill, mut exited)) = handle else {
            debug!(session_id = %id, "kill on unknown session ignored");
            return Ok(());
        };

        info!(session_id = %id, "killing session");
        kill.cancel();
        if exited.wait_for(Option::is_some).await.is_err() {
            debug!(session_id = %id, "session monitor ended without exit report");
        }
        Ok(())
    }

    /// Registered sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .lock()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        infos.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    /// Kill every registered session and wait for all of them to exit.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.lock().await.keys().cloned().collect();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "shutting down sessions");
        let kills = ids.iter().map(|id| self.kill(id));
        for result in futures_util::future::join_all(kills).await {
            if let Err(err) = result {
                warn!(%err, "session shutdown failed");
            }
        }
    }

    /// Spawn `request.command`, feed it `input`, and collect its output.
    ///
    /// The process is not registered. Every sanitized chunk is passed to
    /// `on_output` as it arrives and also accumulated per stream. A spawn
    /// failure yields `ok: false`, exit code -1 and the error text in
    /// `stderr`; it is never returned as an error.
    pub async fn run_once<F>(&self, request: RunOnceRequest, mut on_output: F) -> ProcessOutcome
    where
        F: FnMut(&OutputEvent),
    {
        let RunOnceRequest {
            command,
            cwd,
            env,
            input,
            timeout,
        } = request;

        let mut child = match spawn_shell(&command, &cwd, &env) {
            Ok(child) => child,
            Err(err) => {
                warn!(command, %err, "one-shot spawn failed");
                return ProcessOutcome::spawn_failed(err.to_string());
            }
        };

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        spawn_readers(&mut child, None, &event_tx);
        drop(event_tx);

        // Stdin is fed from its own task so a child that never reads cannot
        // stall output collection. Dropping the pipe closes it.
        let stdin = child.stdin.take();
        let feeder = tokio::spawn(async move {
            match (stdin, input) {
                (Some(mut pipe), Some(input)) => {
                    pipe.write_all(input.as_bytes()).await?;
                    pipe.flush().await
                }
                _ => Ok(()),
            }
        });

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut status = None;
        let mut exited = false;
        let mut events_open = true;
        let mut timed_out = false;

        while !exited || events_open {
            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = event_rx.recv(), if events_open => match event {
                    Some(event) => {
                        match event.stream {
                            StreamKind::Stdout => stdout.push_str(&event.data),
                            StreamKind::Stderr => stderr.push_str(&event.data),
                        }
                        on_output(&event);
                    }
                    None => events_open = false,
                },
                result = child.wait(), if !exited => {
                    exited = true;
                    match result {
                        Ok(exit) => status = Some(exit),
                        Err(err) => {
                            warn!(%err, "failed to wait for one-shot process");
                            push_line(&mut stderr, &format!("wait failed: {err}"));
                        }
                    }
                },
                () = expired, if !exited && !timed_out => {
                    timed_out = true;
                }
            }

            if timed_out && !exited {
                warn!(command, "one-shot process timed out");
                status = terminate(&mut child, self.settings.kill_grace).await;
                exited = true;
            }
        }

        match feeder.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("process exited before reading all input");
            }
            Ok(Err(err)) => {
                warn!(%err, "failed to write input");
                push_line(&mut stderr, &format!("stdin write failed: {err}"));
            }
            Err(err) => warn!(%err, "stdin feeder task failed"),
        }

        if timed_out {
            push_line(&mut stderr, "process timed out");
        }

        let exit_code = exit_code(status);
        ProcessOutcome {
            ok: !timed_out && status.as_ref().is_some_and(ExitStatus::success),
            stdout,
            stderr,
            exit_code,
            timed_out,
        }
    }
}

fn spawn_readers(
    child: &mut Child,
    session_id: Option<&SessionId>,
    event_tx: &mpsc::UnboundedSender<OutputEvent>,
) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_output(
            stdout,
            StreamKind::Stdout,
            session_id.cloned(),
            event_tx.clone(),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_output(
            stderr,
            StreamKind::Stderr,
            session_id.cloned(),
            event_tx.clone(),
        ));
    }
}

async fn write_with_timeout(pipe: &mut ChildStdin, text: &str, limit: Duration) -> Result<()> {
    let write = async {
        pipe.write_all(text.as_bytes()).await?;
        pipe.flush().await
    };
    match tokio::time::timeout(limit, write).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::Io(format!(
            "stdin write timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

async fn monitor_session(
    sessions: SessionMap,
    id: SessionId,
    mut child: Child,
    kill: CancellationToken,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    grace: Duration,
) {
    let waited = tokio::select! {
        result = child.wait() => Some(result),
        () = kill.cancelled() => None,
    };

    let (status, killed, reason) = match waited {
        Some(Ok(status)) => (Some(status), false, format!("exited: {status}")),
        Some(Err(err)) => (None, false, format!("wait failed: {err}")),
        None => {
            let status = terminate(&mut child, grace).await;
            (status, true, "killed".to_owned())
        }
    };

    sessions.lock().await.remove(&id);
    drop(child);

    let exit_code = status.as_ref().and_then(ExitStatus::code);
    info!(killed, code = ?exit_code, "session exited");
    exit_tx.send_replace(Some(ExitInfo {
        session_id: id,
        exit_code,
        killed,
        reason,
    }));
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() && !buffer.ends_with('\n') {
        buffer.push('\n');
    }
    buffer.push_str(line);
    buffer.push('\n');
}
