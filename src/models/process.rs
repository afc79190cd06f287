//! Process registry entry model.

use serde::Serialize;

/// An OS process spawned on behalf of a session or sub-agent scope.
///
/// The registry holds at most one entry per live pid; entries are marked
/// exited (never removed mid-stop) so hard-stop summaries can report what
/// they observed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessSession {
    /// OS process id.
    pub pid: u32,
    /// Session or sub-agent scope that owns the process.
    pub scope_key: String,
    /// Whether the process is still considered running.
    pub alive: bool,
    /// Termination reason once `alive` is false (`"exited"`, `"killed"`, …).
    pub exit_reason: Option<String>,
    /// Spawn time, epoch milliseconds.
    pub started_at_ms: i64,
}

/// Outcome of delivering a signal to a process.
///
/// A stale or already-reaped pid is an expected condition for cleanup paths,
/// not an error; modeling it explicitly keeps genuine signal failures
/// distinguishable from the benign race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The signal was delivered to a live process.
    Delivered,
    /// The process was already gone.
    AlreadyGone,
}
