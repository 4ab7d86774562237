#![forbid(unsafe_code)]

//! `aidash-sandbox`: run AI provider CLIs under change control.
//!
//! `run` executes a provider once against a repository and prints the
//! run result; `interactive` keeps a provider session open and forwards
//! terminal input to it.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use aidash_sandbox::models::output::{OutputEvent, StreamKind};
use aidash_sandbox::models::run::{InteractiveRequest, RunRequest, TaskRef};
use aidash_sandbox::orchestrator::{InteractiveSession, ProviderExecutor, StartedSession};
use aidash_sandbox::{AppError, Result, SandboxConfig};

/// Time allowed for trailing output after an interactive session exits.
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "aidash-sandbox", about = "Provider execution sandbox", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a provider once and enforce the task whitelist.
    Run(RunArgs),
    /// Start an interactive provider session.
    Interactive(InteractiveArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Working directory (repository root).
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Task reference, e.g. `FEAT-0001/PR1`.
    #[arg(long, default_value = "")]
    task: String,

    /// Provider key from `ai/config/providers.json`.
    #[arg(long)]
    provider: Option<String>,

    /// Prompt delivered on stdin.
    #[arg(long)]
    prompt: Option<String>,

    /// Skip change-control enforcement.
    #[arg(long)]
    dry: bool,

    /// Extra environment variable for the provider (`KEY=VALUE`).
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,
}

#[derive(Debug, Args)]
struct InteractiveArgs {
    /// Working directory (repository root).
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Provider key from `ai/config/providers.json`.
    #[arg(long)]
    provider: Option<String>,

    /// Initial prompt.
    #[arg(long)]
    prompt: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let config = match &args.config {
        Some(path) => SandboxConfig::load_from_path(path)?,
        None => SandboxConfig::default(),
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args.command, config))
}

async fn run(command: Command, config: SandboxConfig) -> Result<()> {
    let executor = ProviderExecutor::new(config);
    match command {
        Command::Run(args) => run_once(&executor, args).await,
        Command::Interactive(args) => run_interactive(&executor, args).await,
    }
}

async fn run_once(executor: &ProviderExecutor, args: RunArgs) -> Result<()> {
    let workdir = canonical_workdir(&args.path)?;
    let request = RunRequest {
        task_ref: TaskRef::new(args.task),
        provider: args.provider,
        prompt: args.prompt,
        dry_run: args.dry,
        env: args.env.into_iter().collect::<HashMap<_, _>>(),
    };

    let result = executor.run(&workdir, request, print_event).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_interactive(executor: &ProviderExecutor, args: InteractiveArgs) -> Result<()> {
    let workdir = canonical_workdir(&args.path)?;
    let request = InteractiveRequest {
        provider: args.provider,
        prompt: args.prompt,
        env: HashMap::new(),
    };

    let InteractiveSession { provider, session } =
        executor.start_interactive(&workdir, request).await?;
    let StartedSession {
        id,
        mut output,
        mut exit,
        startup_errors,
    } = session;
    for err in &startup_errors {
        warn!(session_id = %id, %err, "initial prompt not delivered");
    }
    info!(session_id = %id, provider, "session ready, type to send input");

    let printer = tokio::spawn(async move {
        while let Some(event) = output.recv().await {
            print_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            info = exit.wait() => {
                if let Some(info) = info {
                    info!(code = ?info.exit_code, reason = info.reason, "session ended");
                }
                break;
            }
            () = shutdown_signal() => {
                info!("interrupt received, stopping session");
                executor.kill(&id).await?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(err) = executor.write(&id, &format!("{line}\n")).await {
                        warn!(%err, "input not delivered");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!(%err, "terminal input failed");
                    stdin_open = false;
                }
            },
        }
    }

    executor.registry().shutdown().await;
    if tokio::time::timeout(OUTPUT_DRAIN, printer).await.is_err() {
        warn!("output still open after session exit");
    }
    Ok(())
}

fn print_event(event: &OutputEvent) {
    let written = match event.stream {
        StreamKind::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(event.data.as_bytes()).and_then(|()| out.flush())
        }
        StreamKind::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(event.data.as_bytes()).and_then(|()| err.flush())
        }
    };
    if let Err(err) = written {
        warn!(%err, "failed to print provider output");
    }
}

fn canonical_workdir(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|err| AppError::Config(format!("invalid working directory {}: {err}", path.display())))
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
