//! Hard-stop: forceful, cascading cancellation of a session's execution
//! tree.
//!
//! One invocation terminates the session's embedded run, clears its pending
//! reply lanes, tears down every OS process registered under its scope with
//! bounded graceful→forceful escalation, and cascades the same treatment
//! one level into its sub-agent sessions. Everything is best-effort: the
//! only failure that propagates is an unreadable session store, because
//! without it the caller cannot even tell what it asked to stop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, info_span, Instrument};

use crate::gateway::reply_queue::ReplyQueue;
use crate::gateway::run_host::{EmbeddedRunHost, ProcessSupervisor};
use crate::models::hard_stop::{HardStopResult, ScopeKillSummary};
use crate::models::process::KillOutcome;
use crate::persistence::session_store::SessionStore;
use crate::registry::{ProcessRegistry, SubagentRegistry};
use crate::Result;

/// Default delay between graceful and forceful termination.
///
/// Short on purpose: graceful shutdown may be ignored or too slow for
/// interactive cancel-on-demand, and the user expects near-immediate
/// cancellation over a clean exit.
pub const DEFAULT_ESCALATION_MS: u64 = 150;

/// Handles the hard-stop cascade operates on.
pub struct HardStopDeps {
    /// OS process registry.
    pub processes: Arc<ProcessRegistry>,
    /// Sub-agent run registry.
    pub subagents: Arc<SubagentRegistry>,
    /// Embedded run tracking.
    pub run_host: Arc<EmbeddedRunHost>,
    /// Cooperative scope cancellation.
    pub supervisor: Arc<ProcessSupervisor>,
    /// Pending reply lanes.
    pub replies: Arc<ReplyQueue>,
    /// Session binding store (read-only here).
    pub sessions: Arc<SessionStore>,
}

/// Terminate all execution associated with a session and its sub-agent
/// tree.
///
/// When `session_id` is not supplied it is resolved from the session store;
/// an unresolvable id is not an error — process and queue cleanup proceed
/// regardless.
///
/// # Errors
///
/// Returns `AppError::Store` only when the session store itself cannot be
/// read. Every other sub-step is best-effort and never prevents subsequent
/// independent sub-steps from running.
pub async fn hard_stop_session_execution(
    deps: &HardStopDeps,
    session_key: &str,
    session_id: Option<String>,
    escalation_ms: u64,
) -> Result<HardStopResult> {
    let started = Instant::now();
    let span = info_span!("hard_stop", session_key);

    async move {
        // Load the bindings once: id resolution for the root session and for
        // every cascaded child reads from this snapshot.
        let bindings = deps.sessions.load()?;

        let session_id =
            session_id.or_else(|| bindings.get(session_key).map(|e| e.session_id.clone()));

        // ── Clear pending replies, abort the embedded run ────
        let mut clear_keys: Vec<&str> = vec![session_key];
        if let Some(ref id) = session_id {
            clear_keys.push(id.as_str());
        }
        let cleared_queues = deps.replies.clear_session_queues(&clear_keys).await;

        let aborted_run = match session_id {
            Some(ref id) => deps.run_host.abort_run(id).await,
            None => false,
        };

        // ── Root process scope ───────────────────────────────
        let root_processes = hard_stop_process_scope(
            &deps.processes,
            &deps.supervisor,
            session_key,
            escalation_ms,
        )
        .await;

        // ── Cascade one level into descendants ───────────────
        let descendants = deps.subagents.find_by_requester(session_key).await;

        let mut subagent_runs_terminated = 0;
        let mut child_keys: Vec<String> = Vec::new();
        for run in &descendants {
            if run.is_active() && deps.subagents.mark_terminated(&run.run_id, "killed").await {
                subagent_runs_terminated += 1;
            }
            if !child_keys.contains(&run.child_session_key) {
                child_keys.push(run.child_session_key.clone());
            }
        }

        let mut subagent_processes = ScopeKillSummary::default();
        let mut subagent_runs_aborted = 0;
        for child_key in &child_keys {
            let child_id = bindings.get(child_key).map(|e| e.session_id.clone());

            let mut child_clear: Vec<&str> = vec![child_key.as_str()];
            if let Some(ref id) = child_id {
                child_clear.push(id.as_str());
            }
            deps.replies.clear_session_queues(&child_clear).await;

            if let Some(ref id) = child_id {
                if deps.run_host.abort_run(id).await {
                    subagent_runs_aborted += 1;
                }
            }

            subagent_processes.absorb(
                hard_stop_process_scope(
                    &deps.processes,
                    &deps.supervisor,
                    child_key,
                    escalation_ms,
                )
                .await,
            );
        }

        let result = HardStopResult {
            session_key: session_key.to_owned(),
            session_id,
            aborted_run,
            cleared_queues,
            root_processes,
            subagent_processes,
            subagent_runs_terminated,
            subagent_sessions_handled: child_keys.len(),
            subagent_runs_aborted,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        info!(
            aborted_run = result.aborted_run,
            root_force_killed = result.root_processes.force_killed,
            subagent_force_killed = result.subagent_processes.force_killed,
            subagent_runs_terminated = result.subagent_runs_terminated,
            duration_ms = result.duration_ms,
            "hard stop complete"
        );

        Ok(result)
    }
    .instrument(span)
    .await
}

/// Two-phase termination of every process registered under a scope.
///
/// Phase one signals each live process gracefully and requests cooperative
/// cancellation from the supervisor; after the escalation window, phase two
/// re-lists the scope and force-kills the full process tree of anything
/// still present. Signal-all happens-before the wait happens-before
/// force-kill — this ordering is invariant.
pub async fn hard_stop_process_scope(
    processes: &ProcessRegistry,
    supervisor: &ProcessSupervisor,
    scope_key: &str,
    escalation_ms: u64,
) -> ScopeKillSummary {
    let sigterm_requested = processes.signal_scope(scope_key).await;
    supervisor.cancel_scope(scope_key, "hard_stop").await;

    tokio::time::sleep(Duration::from_millis(escalation_ms)).await;

    // Processes that honored the graceful signal are not "still present".
    processes.poll_scope_exits(scope_key).await;
    let still_present = processes.list_scope(scope_key).await;
    let remaining = still_present.len();

    let mut force_killed = 0;
    for pid in still_present {
        if processes.force_kill_tree(pid).await == KillOutcome::Delivered {
            force_killed += 1;
        }
    }

    if sigterm_requested > 0 || remaining > 0 {
        info!(
            scope_key,
            sigterm_requested, force_killed, remaining, "process scope terminated"
        );
    }

    ScopeKillSummary {
        sigterm_requested,
        force_killed,
        remaining,
    }
}
