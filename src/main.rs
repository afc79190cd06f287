#![forbid(unsafe_code)]

//! `agent-switchboard` — chat-driven AI agent runtime gateway binary.
//!
//! Bootstraps configuration, recovers interrupted runs from the durable
//! log, and starts the HTTP gateway, the scheduler reconciler, the process
//! reaper, and the IPC server for `agent-switchboard-ctl`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_switchboard::config::GlobalConfig;
use agent_switchboard::cron::HttpCronService;
use agent_switchboard::gateway::dispatcher::{Dispatcher, GatewayDeps};
use agent_switchboard::gateway::http::{serve_http, HttpState};
use agent_switchboard::gateway::reply_queue::ReplyQueue;
use agent_switchboard::gateway::run_host::{EmbeddedRunHost, ProcessSupervisor};
use agent_switchboard::ipc::server::{spawn_ipc_server, IpcState};
use agent_switchboard::models::run::RunSource;
use agent_switchboard::orchestrator::reaper::spawn_reaper;
use agent_switchboard::orchestrator::recovery::{recover_interrupted_runs, RecoveryFilter};
use agent_switchboard::persistence::planner_store::PlannerStore;
use agent_switchboard::persistence::run_log::RunLog;
use agent_switchboard::persistence::scheduler_state::SchedulerStateStore;
use agent_switchboard::persistence::session_store::SessionStore;
use agent_switchboard::registry::{ProcessRegistry, SubagentRegistry};
use agent_switchboard::scheduler::effects::{EffectRouter, HttpCalendarSync, LaneSender};
use agent_switchboard::scheduler::SchedulerReconciler;
use agent_switchboard::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-switchboard", about = "Chat-driven agent runtime gateway", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured state directory.
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-switchboard bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config_text = std::fs::read_to_string(&args.config)
        .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
    let mut config = GlobalConfig::from_toml_str(&config_text)?;

    // Override state dir from CLI if provided.
    if let Some(state_dir) = args.state_dir {
        std::fs::create_dir_all(&state_dir)
            .map_err(|err| AppError::Config(format!("invalid state dir override: {err}")))?;
        config.state_dir = state_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid state dir override: {err}")))?;
    }

    // Load secrets from keyring / env vars.
    config.load_credentials().await?;

    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Build shared gateway state ──────────────────────
    let processes = Arc::new(ProcessRegistry::new());
    let subagents = Arc::new(SubagentRegistry::new());
    let run_host = Arc::new(EmbeddedRunHost::new());
    let supervisor = Arc::new(ProcessSupervisor::new());
    let replies = Arc::new(ReplyQueue::new());
    let run_log = Arc::new(RunLog::new(config.runs_file()));
    let sessions = Arc::new(SessionStore::new(config.sessions_file()));
    let planner = Arc::new(PlannerStore::new(config.planner_file()));

    let deps = Arc::new(GatewayDeps {
        config: Arc::clone(&config),
        processes: Arc::clone(&processes),
        subagents: Arc::clone(&subagents),
        run_host: Arc::clone(&run_host),
        supervisor: Arc::clone(&supervisor),
        replies: Arc::clone(&replies),
        run_log: Arc::clone(&run_log),
        sessions: Arc::clone(&sessions),
    });
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&deps)));

    // ── Recover interrupted runs from prior crash ───────
    recover_on_startup(&config, &run_log, &sessions, &dispatcher).await;

    let ct = CancellationToken::new();

    // ── Start background services ───────────────────────
    let reaper_handle = spawn_reaper(
        Arc::clone(&processes),
        Arc::clone(&subagents),
        ct.clone(),
    );

    let scheduler_handle = if config.scheduler.enabled && !config.cron.base_url.is_empty() {
        let cron = Arc::new(HttpCronService::new(
            &config.cron.base_url,
            config.cron.token.clone(),
        ));
        let calendar = if config.scheduler.calendar_sync.enabled
            && !config.scheduler.calendar_sync.endpoint.is_empty()
        {
            Some(Arc::new(HttpCalendarSync::new(
                &config.scheduler.calendar_sync.endpoint,
            )) as Arc<dyn agent_switchboard::scheduler::effects::CalendarSync>)
        } else {
            None
        };
        let effects = EffectRouter::new(
            config.scheduler.clone(),
            Arc::clone(&planner),
            Arc::clone(&replies),
            calendar,
            Arc::new(LaneSender::new(Arc::clone(&replies))),
        )?;
        let reconciler = Arc::new(SchedulerReconciler::new(
            Arc::clone(&config),
            cron,
            SchedulerStateStore::new(config.scheduler_state_file()),
            Arc::clone(&planner),
            effects,
        ));
        info!(agent = %config.scheduler.agent, "scheduler reconciler started");
        Some(reconciler.spawn(ct.clone()))
    } else {
        info!("scheduler disabled");
        None
    };

    // Generate a random IPC auth token for this server instance.
    let ipc_auth_token = uuid::Uuid::new_v4().to_string();
    info!(ipc_auth_token = %ipc_auth_token, "IPC auth token for this instance");

    let ipc_state = Arc::new(IpcState {
        dispatcher: Arc::clone(&dispatcher),
        auth_token: Some(ipc_auth_token),
    });
    let ipc_handle = spawn_ipc_server(ipc_state, &config.gateway.ipc_name, ct.clone())?;

    let http_state = Arc::new(HttpState {
        dispatcher: Arc::clone(&dispatcher),
        config: Arc::clone(&config),
        started_at: Instant::now(),
    });
    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = serve_http(http_state, http_ct).await {
            error!(%err, "http gateway failed");
        }
    });

    info!("agent-switchboard ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Wait for background tasks ───────────────────────
    let _ = tokio::join!(reaper_handle, ipc_handle, http_handle);
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    info!("agent-switchboard shut down");

    Ok(())
}

/// Run one recovery pass per enabled dispatch subsystem.
///
/// Chat and WhatsApp auto-reply recover independently: each pass filters
/// the run log to its own source so neither touches the other's entries.
async fn recover_on_startup(
    config: &Arc<GlobalConfig>,
    run_log: &Arc<RunLog>,
    sessions: &Arc<SessionStore>,
    dispatcher: &Arc<Dispatcher>,
) {
    let mut sources = vec![RunSource::ChatSend];
    if config.whatsapp.enabled {
        sources.push(RunSource::WhatsappAutoReply);
    }

    for source in sources {
        let filter = RecoveryFilter {
            source: Some(source),
            account_id: None,
        };
        let dispatcher = Arc::clone(dispatcher);
        let report = recover_interrupted_runs(run_log, sessions, &filter, move |entry| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.resume_run(&entry).await }
        })
        .await;

        info!(
            source = source.as_str(),
            scanned = report.scanned,
            resumed = report.resumed,
            expired = report.expired,
            dropped = report.dropped,
            "startup recovery pass finished"
        );
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
    let subscriber = fmt().with_env_filter(env_filter);

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
