//! Registry of delegated sub-agent runs keyed by run id.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::models::now_ms;
use crate::models::subagent::DescendantRun;

/// Registry of parent→child run relationships for delegated executions.
#[derive(Default)]
pub struct SubagentRegistry {
    inner: Mutex<HashMap<String, DescendantRun>>,
}

impl SubagentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new delegated run.
    pub async fn register(
        &self,
        run_id: &str,
        child_session_key: &str,
        requester_session_key: &str,
    ) -> DescendantRun {
        let run = DescendantRun {
            run_id: run_id.to_owned(),
            child_session_key: child_session_key.to_owned(),
            requester_session_key: requester_session_key.to_owned(),
            created_at_ms: now_ms(),
            ended_at_ms: None,
            end_reason: None,
        };
        let mut inner = self.inner.lock().await;
        inner.insert(run_id.to_owned(), run.clone());
        debug!(run_id, child_session_key, requester_session_key, "sub-agent run registered");
        run
    }

    /// All runs requested by a session, active and ended.
    pub async fn find_by_requester(&self, requester_session_key: &str) -> Vec<DescendantRun> {
        let inner = self.inner.lock().await;
        inner
            .values()
            .filter(|run| run.requester_session_key == requester_session_key)
            .cloned()
            .collect()
    }

    /// Mark a run terminated. `ended_at_ms` is set exactly once; calling
    /// again on an ended run is a no-op returning `false`.
    pub async fn mark_terminated(&self, run_id: &str, reason: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(run_id) {
            Some(run) if run.is_active() => {
                run.ended_at_ms = Some(now_ms());
                run.end_reason = Some(reason.to_owned());
                true
            }
            _ => false,
        }
    }

    /// Mark every active run executing under a child session key terminated.
    ///
    /// Returns the number of runs transitioned. Used by the reaper when a
    /// child scope's process exits outside a hard-stop.
    pub async fn end_runs_for_child(&self, child_session_key: &str, reason: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        let mut ended = 0;
        for run in inner.values_mut() {
            if run.is_active() && run.child_session_key == child_session_key {
                run.ended_at_ms = Some(now);
                run.end_reason = Some(reason.to_owned());
                ended += 1;
            }
        }
        ended
    }

    /// Number of runs with `ended_at_ms` unset.
    pub async fn active_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.values().filter(|run| run.is_active()).count()
    }

    /// Snapshot of all tracked runs.
    pub async fn snapshot(&self) -> Vec<DescendantRun> {
        let inner = self.inner.lock().await;
        inner.values().cloned().collect()
    }
}
