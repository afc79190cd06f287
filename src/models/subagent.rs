//! Sub-agent run records linking delegated runs to their requesters.

use serde::Serialize;

/// A record linking a sub-agent run to the session that requested it.
///
/// Runs with `ended_at_ms` unset are active and are the only ones eligible
/// for cascade termination during a hard-stop of the requester.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DescendantRun {
    /// Unique run identifier.
    pub run_id: String,
    /// Session key the delegated run executes under.
    pub child_session_key: String,
    /// Session key that requested the delegation.
    pub requester_session_key: String,
    /// Registration time, epoch milliseconds.
    pub created_at_ms: i64,
    /// Termination time; set exactly once.
    pub ended_at_ms: Option<i64>,
    /// Termination reason once ended (`"exited"`, `"killed"`, …).
    pub end_reason: Option<String>,
}

impl DescendantRun {
    /// Whether the run has not yet terminated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at_ms.is_none()
    }
}
