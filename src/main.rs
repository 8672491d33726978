#![forbid(unsafe_code)]

//! `cchub`: chat with a coding agent from the terminal.
//!
//! Loads the configuration, launches the selected agent through the
//! [`Router`], then reads prompts from stdin line by line. While a
//! permission request is active, a line holding an option number answers
//! it. `/cancel` stops the current turn and `/quit` exits.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cchub::agents::{build_agent_config, CommandSource};
use cchub::driver::{AgentClient, ClientEvent, Router};
use cchub::models::{PermissionRequestView, PromptContent, SessionUpdate};
use cchub::platform::CliDetector;
use cchub::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "cchub", about = "Chat with ACP and Codex coding agents", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent id to launch; `default_agent` or the first enabled agent otherwise.
    #[arg(long)]
    agent: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Working directory of the session.
    #[arg(long)]
    cwd: Option<PathBuf>,
}

/// The permission request the user can currently answer.
type ActivePermission = Arc<Mutex<Option<PermissionRequestView>>>;

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.load_credentials().await;
    let settings = config.settings();

    let cwd = match args.cwd {
        Some(cwd) => cwd
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid --cwd: {err}")))?,
        None => config.working_directory()?,
    };

    // ── Resolve the agent ───────────────────────────────
    let profile = config.select_agent(args.agent.as_deref())?;
    let runtime = build_agent_config(profile, &cwd, &CliDetector::from_env());
    if runtime.command.source == CommandSource::Unresolved {
        return Err(AppError::Config(format!(
            "no command configured for agent '{}' and none of {:?} found on PATH",
            profile.id, runtime.module.command_candidates
        )));
    }
    if let Some(summary) = runtime.command.detection_summary() {
        info!(agent = %profile.id, command = %summary, "using detected command");
    }

    // ── Start the agent ─────────────────────────────────
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let router = Arc::new(Router::from_settings(&settings, &events_tx));
    drop(events_tx);

    let active: ActivePermission = Arc::default();
    let printer = tokio::spawn(print_events(events_rx, Arc::clone(&active)));

    let init = router.initialize(runtime.config).await?;
    info!(protocol_version = init.protocol_version, auth_methods = init.auth_methods.len(), "agent initialized");
    let session = router.new_session(&cwd).await?;
    info!(session_id = %session.session_id, cwd = %cwd.display(), "session ready");
    eprintln!("Connected to {}. Type a prompt, /cancel or /quit.", profile.id);

    // ── Read user input ─────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            biased;
            () = shutdown_signal() => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!(%err, "stdin read failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" => break,
            "/cancel" => {
                if let Err(err) = router.cancel(&session.session_id).await {
                    warn!(%err, "cancel failed");
                }
            }
            _ => {
                if let Some((request_id, option_id)) = permission_choice(&active, line) {
                    if let Err(err) = router.respond_to_permission(&request_id, &option_id).await {
                        warn!(%err, "permission response failed");
                    }
                    continue;
                }
                let router = Arc::clone(&router);
                let session_id = session.session_id.clone();
                let content = vec![PromptContent::text(line)];
                tokio::spawn(async move {
                    if let Err(err) = router.send_prompt(&session_id, content).await {
                        error!(%err, "prompt failed");
                    }
                });
            }
        }
    }

    router.disconnect().await?;
    drop(router);
    if let Err(err) = printer.await {
        warn!(%err, "event printer stopped abnormally");
    }
    info!("cchub shut down");
    Ok(())
}

/// Map a 1-based option number to the active request's option.
fn permission_choice(active: &ActivePermission, line: &str) -> Option<(String, String)> {
    let index: usize = line.parse().ok()?;
    let guard = active.lock().unwrap_or_else(PoisonError::into_inner);
    let request = guard.as_ref()?;
    let option = request.options.get(index.checked_sub(1)?)?;
    Some((request.request_id.clone(), option.option_id.clone()))
}

async fn print_events(mut events: mpsc::UnboundedReceiver<ClientEvent>, active: ActivePermission) {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::SessionUpdate(update) => {
                track_permission(&active, &update);
                render_update(&mut stdout, &update);
            }
            ClientEvent::Error(error) => {
                eprintln!("\n[{}] {}", error.title, error.message);
                if let Some(suggestion) = error.suggestion {
                    eprintln!("  {suggestion}");
                }
            }
        }
        let _ = stdout.flush();
    }
}

fn track_permission(active: &ActivePermission, update: &SessionUpdate) {
    let Some(request) = update.permission_request() else {
        return;
    };
    let mut guard = active.lock().unwrap_or_else(PoisonError::into_inner);
    let settled = request.selected_option_id.is_some() || request.is_cancelled;
    if request.is_active && !settled {
        *guard = Some(request.clone());
    } else if guard
        .as_ref()
        .is_some_and(|current| current.request_id == request.request_id)
    {
        *guard = None;
    }
}

fn render_update(out: &mut impl std::io::Write, update: &SessionUpdate) {
    let _ = match update {
        SessionUpdate::AgentMessageChunk { text, .. } => write!(out, "{text}"),
        SessionUpdate::AgentThoughtChunk { text, .. } => write!(out, "\x1b[2m{text}\x1b[0m"),
        SessionUpdate::ToolCall(event) | SessionUpdate::ToolCallUpdate(event) => {
            let title = event.title.as_deref().unwrap_or(&event.tool_call_id);
            let mut result = match event.status {
                Some(status) => writeln!(out, "\n• {title} [{status:?}]"),
                None => writeln!(out, "\n• {title}"),
            };
            if let Some(request) = event
                .permission_request
                .as_ref()
                .filter(|request| request.is_active && request.selected_option_id.is_none() && !request.is_cancelled)
            {
                for (index, option) in request.options.iter().enumerate() {
                    result = result.and_then(|()| writeln!(out, "  {}. {}", index + 1, option.name));
                }
            }
            result
        }
        SessionUpdate::Plan { entries, .. } => entries
            .iter()
            .try_for_each(|entry| writeln!(out, "  [{}] {}", entry.status, entry.content)),
        SessionUpdate::AvailableCommandsUpdate { commands, .. } => {
            writeln!(out, "\n({} commands available)", commands.len())
        }
        SessionUpdate::CurrentModeUpdate { current_mode_id, .. } => {
            writeln!(out, "\n(mode: {current_mode_id})")
        }
    };
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "ctrl-c signal handler failed");
        std::future::pending::<()>().await;
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

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
