//! Scheduler reconciler state (`gateway/scheduler-<agent>.json`).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::cron::SchedulerJobRef;
use crate::Result;

use super::{read_json_file, write_json_atomic};

/// Reconciler state: job-ref bindings, last-processed run markers, and the
/// last tick error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    /// Internal job key → external cron job binding.
    #[serde(default)]
    pub job_refs: HashMap<String, SchedulerJobRef>,
    /// Internal job key → last processed firing timestamp (epoch ms).
    ///
    /// Advanced only after a firing has been observed, guaranteeing each
    /// firing is processed at most once.
    #[serde(default)]
    pub run_markers: HashMap<String, i64>,
    /// Most recent tick failure, for status tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SchedulerStateFile {
    version: u32,
    #[serde(flatten)]
    state: SchedulerState,
}

/// Store handle for the reconciler state file.
pub struct SchedulerStateStore {
    path: PathBuf,
}

impl SchedulerStateStore {
    /// Create a store handle over the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the state; missing or corrupt files start fresh.
    ///
    /// Reconciliation is self-healing: losing this state costs at most one
    /// duplicate pass over already-converged jobs, so a corrupt file is
    /// logged and discarded rather than failing the tick loop.
    #[must_use]
    pub fn load(&self) -> SchedulerState {
        match read_json_file(&self.path) {
            Ok(None) => SchedulerState::default(),
            Ok(Some(value)) => match serde_json::from_value::<SchedulerStateFile>(value) {
                Ok(file) => file.state,
                Err(err) => {
                    warn!(%err, path = %self.path.display(), "scheduler state invalid; starting fresh");
                    SchedulerState::default()
                }
            },
            Err(err) => {
                warn!(%err, path = %self.path.display(), "scheduler state unreadable; starting fresh");
                SchedulerState::default()
            }
        }
    }

    /// Rewrite the state file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` when the rewrite fails.
    pub fn save(&self, state: &SchedulerState) -> Result<()> {
        write_json_atomic(
            &self.path,
            &SchedulerStateFile {
                version: 1,
                state: state.clone(),
            },
        )
    }
}
