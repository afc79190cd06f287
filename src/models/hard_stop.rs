//! Hard-stop result aggregation and the user-facing reply text.

use serde::Serialize;

/// Kill counts for one process scope (session or sub-agent).
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScopeKillSummary {
    /// Graceful termination signals delivered in phase one.
    pub sigterm_requested: usize,
    /// Processes force-killed in phase two.
    pub force_killed: usize,
    /// Processes still registered when phase two began.
    pub remaining: usize,
}

impl ScopeKillSummary {
    /// Fold another scope's counts into this aggregate.
    pub fn absorb(&mut self, other: Self) {
        self.sigterm_requested += other.sigterm_requested;
        self.force_killed += other.force_killed;
        self.remaining += other.remaining;
    }
}

/// Reply-queue cleanup counts.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClearedQueues {
    /// Distinct lanes cleared.
    pub lanes: usize,
    /// Queued entries dropped.
    pub entries: usize,
}

/// Aggregate report of one hard-stop invocation.
///
/// Constructed fresh per call and never persisted; the cascade's effects are
/// visible only through the registries and stores it touched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HardStopResult {
    /// Session key the stop targeted.
    pub session_key: String,
    /// Session id, when one could be resolved.
    pub session_id: Option<String>,
    /// Whether an embedded run was actually aborted.
    pub aborted_run: bool,
    /// Reply-queue cleanup counts for the root session.
    pub cleared_queues: ClearedQueues,
    /// Kill counts for the root session's process scope.
    pub root_processes: ScopeKillSummary,
    /// Aggregate kill counts across all descendant scopes.
    pub subagent_processes: ScopeKillSummary,
    /// Active descendant runs marked terminated.
    pub subagent_runs_terminated: usize,
    /// Distinct descendant session keys handled.
    pub subagent_sessions_handled: usize,
    /// Descendant embedded runs aborted.
    pub subagent_runs_aborted: usize,
    /// Total cascade duration.
    pub duration_ms: u64,
}

/// Render the one-line operator reply for a hard-stop result.
///
/// Four fixed templates: nothing stopped, processes only, sub-agents only,
/// or both joined with "and".
#[must_use]
pub fn format_hard_stop_reply(result: &HardStopResult) -> String {
    let processes = result.root_processes.force_killed + result.subagent_processes.force_killed;
    let subagents = result.subagent_runs_terminated;

    match (processes, subagents) {
        (0, 0) => "⚙️ Agent was aborted.".to_owned(),
        (p, 0) => format!("⚙️ Agent was aborted. Killed {p} {}.", plural(p, "process", "processes")),
        (0, s) => format!(
            "⚙️ Agent was aborted. Killed {s} {}.",
            plural(s, "sub-agent", "sub-agents")
        ),
        (p, s) => format!(
            "⚙️ Agent was aborted. Killed {p} {} and {s} {}.",
            plural(p, "process", "processes"),
            plural(s, "sub-agent", "sub-agents")
        ),
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}
