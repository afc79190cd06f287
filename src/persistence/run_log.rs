//! Durable log of in-flight runs (`gateway/chat-runs.json`).
//!
//! Schema: `{"version": 2, "runs": {<runId>: PersistedRun}}`. Version-1
//! files carry no `source` field; their entries load with `source`
//! defaulted to `chat_send` and the file upgrades to version 2 on the next
//! write. A missing, unparseable, or unknown-version file is treated as an
//! empty store — recovery must never fail startup.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::now_ms;
use crate::models::run::{PersistedRun, RunSource};
use crate::Result;

use super::{read_json_file, write_json_atomic};

/// Current on-disk schema version.
pub const RUN_LOG_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct RunLogFile {
    version: u32,
    #[serde(default)]
    runs: HashMap<String, PersistedRun>,
}

/// Registration request for [`RunLog::mark_run_in_flight`].
#[derive(Debug, Clone)]
pub struct MarkRunInFlight {
    /// Unique run identifier.
    pub run_id: String,
    /// Session key the run executes under.
    pub session_key: String,
    /// Subsystem starting the run.
    pub source: RunSource,
    /// Optional owning account.
    pub account_id: Option<String>,
}

/// The durable run recovery log.
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Create a log handle over the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load all persisted runs.
    ///
    /// Never fails: a missing, corrupt, or unknown-version file yields an
    /// empty map (logged at warn for the corrupt cases).
    #[must_use]
    pub fn load(&self) -> HashMap<String, PersistedRun> {
        let value = match read_json_file(&self.path) {
            Ok(Some(value)) => value,
            Ok(None) => return HashMap::new(),
            Err(err) => {
                warn!(%err, path = %self.path.display(), "run log unreadable; starting empty");
                return HashMap::new();
            }
        };

        let version = value.get("version").and_then(serde_json::Value::as_u64);
        if !matches!(version, Some(1 | 2)) {
            warn!(
                ?version,
                path = %self.path.display(),
                "run log has unrecognized schema version; starting empty"
            );
            return HashMap::new();
        }

        match serde_json::from_value::<RunLogFile>(value) {
            Ok(file) => file.runs,
            Err(err) => {
                warn!(%err, path = %self.path.display(), "run log entries invalid; starting empty");
                HashMap::new()
            }
        }
    }

    /// Rewrite the whole log with the given run map.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` on serialization or
    /// filesystem failure.
    pub fn save(&self, runs: &HashMap<String, PersistedRun>) -> Result<()> {
        write_json_atomic(
            &self.path,
            &RunLogFile {
                version: RUN_LOG_VERSION,
                runs: runs.clone(),
            },
        )
    }

    /// Upsert an in-flight run record.
    ///
    /// Blank `run_id` or `session_key` is a silent no-op — callers are
    /// expected to register only validated identifiers, and registration
    /// must be cheap to sprinkle on every dispatch path. Re-registering an
    /// existing run is an idempotent re-arm: `started_at_ms`,
    /// `recovery_attempts`, and `last_recovery_at_ms` survive, only
    /// `updated_at_ms` advances.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` when the rewrite fails.
    pub fn mark_run_in_flight(&self, request: &MarkRunInFlight) -> Result<()> {
        let run_id = request.run_id.trim();
        let session_key = request.session_key.trim();
        if run_id.is_empty() || session_key.is_empty() {
            debug!("ignoring run registration with blank identifiers");
            return Ok(());
        }

        let mut runs = self.load();
        let now = now_ms();

        let entry = match runs.remove(run_id) {
            Some(existing) => PersistedRun {
                run_id: run_id.to_owned(),
                session_key: session_key.to_owned(),
                source: request.source,
                account_id: request.account_id.clone(),
                started_at_ms: existing.started_at_ms,
                updated_at_ms: now,
                recovery_attempts: existing.recovery_attempts,
                last_recovery_at_ms: existing.last_recovery_at_ms,
            },
            None => PersistedRun {
                run_id: run_id.to_owned(),
                session_key: session_key.to_owned(),
                source: request.source,
                account_id: request.account_id.clone(),
                started_at_ms: now,
                updated_at_ms: now,
                recovery_attempts: 0,
                last_recovery_at_ms: None,
            },
        };

        runs.insert(run_id.to_owned(), entry);
        self.save(&runs)
    }

    /// Remove a run record; absent ids are a no-op, not an error.
    ///
    /// Called on every normal run completion path — forgetting this call is
    /// the primary leak vector, which is why the edge cases here are no-ops
    /// rather than errors.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` when the rewrite fails.
    pub fn clear_run_in_flight(&self, run_id: &str) -> Result<()> {
        let run_id = run_id.trim();
        if run_id.is_empty() {
            return Ok(());
        }

        let mut runs = self.load();
        if runs.remove(run_id).is_none() {
            return Ok(());
        }
        self.save(&runs)
    }
}
