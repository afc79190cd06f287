//! Exited-process reaper — detects agent processes that ended on their own.
//!
//! Periodically polls the process registry for exited children, logs their
//! exit status, and closes any sub-agent runs that were executing under the
//! exited scope so the sub-agent registry does not accumulate phantom
//! active runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::{ProcessRegistry, SubagentRegistry};

/// Interval between polls for child process exits.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn the background reaper task.
///
/// The task polls at [`POLL_INTERVAL`] until the cancellation token fires.
#[must_use]
pub fn spawn_reaper(
    processes: Arc<ProcessRegistry>,
    subagents: Arc<SubagentRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("process reaper shutting down");
                    break;
                }
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            reap_once(&processes, &subagents).await;
        }
    })
}

/// One reap pass: collect exited children and close their sub-agent runs.
pub async fn reap_once(processes: &ProcessRegistry, subagents: &SubagentRegistry) {
    for (pid, scope_key, exit_status) in processes.reap_exited().await {
        let status_text = exit_status.map_or_else(
            || "status unknown".to_owned(),
            |status| {
                if status.success() {
                    "exited normally (code 0)".to_owned()
                } else {
                    status.code().map_or_else(
                        || "terminated by signal".to_owned(),
                        |code| format!("exited with code {code}"),
                    )
                }
            },
        );

        info!(pid, scope_key, status = %status_text, "agent process reaped");

        let ended = subagents.end_runs_for_child(&scope_key, "exited").await;
        if ended > 0 {
            info!(scope_key, ended, "closed sub-agent runs for exited scope");
        }
    }
}
