//! Provider execution orchestrator.
//!
//! A run resolves the provider command, allocates an artifact directory,
//! snapshots the working tree, runs the provider once with the prompt on
//! stdin, persists the transcript and, unless it is a dry run, reconciles
//! the tree against the task whitelist.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::artifacts::{ArtifactStore, PROMPT_FILE, RESULT_FILE, RUN_LOG};
use crate::config::SandboxConfig;
use crate::models::output::OutputEvent;
use crate::models::run::{InteractiveRequest, RunRequest, RunResult, RunState};
use crate::models::session::SessionId;
use crate::orchestrator::registry::{
    ProcessSettings, RunOnceRequest, SessionRegistry, SpawnRequest, StartedSession,
};
use crate::policy::{reconcile, ReconcileReport, Whitelist};
use crate::providers::ProviderRegistry;
use crate::snapshot::{GitCli, Snapshot, VersionControl};
use crate::Result;

/// Interactive session started by [`ProviderExecutor::start_interactive`].
#[derive(Debug)]
pub struct InteractiveSession {
    /// Provider key that was chosen.
    pub provider: String,
    /// The live session.
    pub session: StartedSession,
}

/// Runs provider CLIs under change control.
#[derive(Clone)]
pub struct ProviderExecutor {
    registry: SessionRegistry,
    vcs: Arc<dyn VersionControl>,
    config: Arc<SandboxConfig>,
}

impl ProviderExecutor {
    /// Executor using the `git` binary and a fresh session registry.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        let registry = SessionRegistry::new(ProcessSettings::from(&config));
        Self::with_parts(config, registry, Arc::new(GitCli::new()))
    }

    /// Executor with an injected registry and version-control adapter.
    #[must_use]
    pub fn with_parts(
        config: SandboxConfig,
        registry: SessionRegistry,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            registry,
            vcs,
            config: Arc::new(config),
        }
    }

    /// Session registry owned by this executor.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Execute one provider run in `workdir`.
    ///
    /// Provider failures (including a command that cannot be launched)
    /// produce `ok: false` rather than an error, and enforcement problems
    /// only degrade the result. `on_output` receives every sanitized chunk
    /// as it arrives.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Artifact`] if the run directory cannot be
    /// created, since the run would leave no record otherwise.
    pub async fn run<F>(&self, workdir: &Path, request: RunRequest, mut on_output: F) -> Result<RunResult>
    where
        F: FnMut(&OutputEvent),
    {
        let providers = ProviderRegistry::load(workdir);
        let provider = providers.resolve(request.provider.as_deref());
        let task_key = request.task_ref.artifact_key().to_owned();

        let span = info_span!(
            "run_provider",
            provider = provider.name,
            task = task_key,
            dry_run = request.dry_run
        );

        async move {
            let mut state = RunState::Pending;

            let store = ArtifactStore::new(workdir, &self.config.artifacts_dir);
            let artifacts = store.create_run_dir(&task_key, Utc::now()).await?;

            let whitelist = Whitelist::load(workdir, &request.task_ref);
            let versioned = self.vcs.is_repository(workdir).await;
            let own_dir = artifacts.relative().to_string_lossy().into_owned();
            let before = if versioned {
                self.capture(workdir, &own_dir).await
            } else {
                debug!(cwd = %workdir.display(), "not a repository, enforcement disabled");
                Snapshot::empty()
            };

            let prompt = self.prompt_or_default(request.prompt.as_deref());
            let mut transcript = String::new();

            state = advance(state, RunState::Running);
            let outcome = self
                .registry
                .run_once(
                    RunOnceRequest {
                        command: provider.command.clone(),
                        cwd: workdir.to_path_buf(),
                        env: self.merged_env(&request.env),
                        input: Some(format!("{prompt}\n")),
                        timeout: self.config.run_timeout(),
                    },
                    |event| {
                        transcript.push_str(&event.data);
                        on_output(event);
                    },
                )
                .await;

            if transcript.is_empty() && !outcome.stderr.is_empty() {
                // Nothing streamed; keep the failure reason in the transcript.
                transcript.push_str(&outcome.stderr);
            }

            if let Err(err) = store.write_file(&artifacts, RUN_LOG, &transcript).await {
                warn!(%err, "failed to persist transcript");
            }
            if let Err(err) = store.write_file(&artifacts, PROMPT_FILE, &prompt).await {
                warn!(%err, "failed to persist prompt");
            }

            let report = if versioned && !request.dry_run {
                let after = self.capture(workdir, &own_dir).await;
                reconcile(self.vcs.as_ref(), &before, &after, &whitelist, workdir).await
            } else {
                ReconcileReport::default()
            };

            let result = RunResult {
                ok: outcome.ok,
                provider: provider.name.clone(),
                artifacts_dir: artifacts.relative().to_path_buf(),
                changed: report.changed,
                blocked: report.blocked,
                revert_failures: report.revert_failures,
                exit_code: outcome.exit_code,
            };

            if let Err(err) = store.write_json(&artifacts, RESULT_FILE, &result).await {
                warn!(%err, "failed to persist run result");
            }

            let state = advance(state, result.state());
            info!(
                ?state,
                exit_code = result.exit_code,
                timed_out = outcome.timed_out,
                changed = result.changed.len(),
                blocked = result.blocked.len(),
                artifacts = %result.artifacts_dir.display(),
                "provider run finished"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Start an interactive provider session fed with the initial prompt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Spawn`] if the session cannot be started.
    pub async fn start_interactive(
        &self,
        workdir: &Path,
        request: InteractiveRequest,
    ) -> Result<InteractiveSession> {
        let providers = ProviderRegistry::load(workdir);
        let provider = providers.resolve(request.provider.as_deref());
        let prompt = self.prompt_or_default(request.prompt.as_deref());

        let session = self
            .registry
            .start(SpawnRequest {
                command: provider.command,
                cwd: workdir.to_path_buf(),
                env: self.merged_env(&request.env),
                initial_input: Some(format!("{prompt}\n")),
            })
            .await?;

        info!(
            session_id = %session.id,
            provider = provider.name,
            "interactive session started"
        );
        Ok(InteractiveSession {
            provider: provider.name,
            session,
        })
    }

    /// Write to a live session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::SessionNotFound`] for an unknown or exited
    /// session.
    pub async fn write(&self, id: &SessionId, text: &str) -> Result<()> {
        self.registry.write(id, text).await
    }

    /// Kill a live session; unknown sessions are ignored.
    ///
    /// # Errors
    ///
    /// Propagates registry errors.
    pub async fn kill(&self, id: &SessionId) -> Result<()> {
        self.registry.kill(id).await
    }

    /// Snapshot of `workdir` ignoring this run's own artifact directory.
    /// Anything else under the artifact root is enforced like any path.
    async fn capture(&self, workdir: &Path, own_dir: &str) -> Snapshot {
        Snapshot::capture(self.vcs.as_ref(), workdir)
            .await
            .excluding(own_dir)
    }

    fn prompt_or_default(&self, prompt: Option<&str>) -> String {
        prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.config.default_prompt)
            .to_owned()
    }

    fn merged_env(&self, overlay: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = self.config.env.clone();
        env.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

fn advance(current: RunState, next: RunState) -> RunState {
    if current.can_transition_to(next) {
        debug!(from = ?current, to = ?next, "run state transition");
    } else {
        warn!(from = ?current, to = ?next, "unexpected run state transition");
    }
    next
}
