//! Agent process host.
//!
//! Runs one agent turn by spawning the configured host CLI with:
//! - `kill_on_drop(true)` so processes are cleaned up automatically.
//! - `env_clear()` + a safe variable allowlist so gateway secrets are never
//!   visible to the agent process.
//! - Its own process group (Unix), so hard-stop's force phase can take the
//!   whole tree down with one signal to the group.
//!
//! The spawned pid is registered in the [`ProcessRegistry`] under the
//! session's scope key before any output is read, so a hard-stop issued
//! mid-turn always sees the process.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::registry::ProcessRegistry;
use crate::{AppError, Result};

/// Environment variables inherited by the spawned agent process.
///
/// Every other variable is stripped via `env_clear()` before the child is
/// launched, so keychain-loaded secrets never leak into agent tooling.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Spawn the host CLI for one agent turn and capture its reply.
///
/// Blocks until the process closes stdout (its reply is complete) or the
/// run's cancellation token fires. On cancellation a graceful termination
/// signal is sent and the run reports aborted; the hard-stop escalation
/// path owns forceful cleanup.
///
/// # Errors
///
/// Returns `AppError::Process` if the process cannot be spawned, produces
/// unreadable output, or the run is aborted.
pub async fn run_agent_process(
    config: &GatewayConfig,
    registry: &ProcessRegistry,
    scope_key: &str,
    session_key: &str,
    prompt: &str,
    cancel: CancellationToken,
) -> Result<String> {
    let mut cmd = Command::new(&config.host_cli);
    cmd.args(&config.host_cli_args)
        .arg(prompt)
        .env_clear()
        .env("SWITCHBOARD_SESSION_KEY", session_key)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for var in ALLOWED_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            cmd.env(var, value);
        }
    }

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Process(format!("failed to spawn host cli: {err}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Process("child stdout not captured".into()))?;
    let stderr = child.stderr.take();

    let pid = registry.register(scope_key, child).await?;
    info!(pid, scope_key, host_cli = %config.host_cli, "agent process spawned");

    // Drain stderr concurrently so a chatty agent cannot dead-lock on a
    // full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut buffer = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut buffer).await;
        }
        buffer
    });

    let mut reader = stdout;
    let mut output = String::new();

    tokio::select! {
        read = reader.read_to_string(&mut output) => {
            if let Err(err) = read {
                warn!(pid, %err, "failed to read agent output");
                return Err(AppError::Process(format!("failed to read agent output: {err}")));
            }
        }
        () = cancel.cancelled() => {
            debug!(pid, scope_key, "run cancelled; requesting termination");
            registry.signal_term(pid).await;
            return Err(AppError::Process("run aborted".into()));
        }
    }

    if let Ok(errors) = stderr_task.await {
        if !errors.trim().is_empty() {
            debug!(pid, stderr = %errors.trim(), "agent stderr");
        }
    }

    Ok(output.trim().to_owned())
}
