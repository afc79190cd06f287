//! Embedded run tracking and cooperative scope cancellation.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Registry of live embedded agent runs keyed by session id.
///
/// Each run holds a `CancellationToken`; aborting a run cancels the token,
/// which the agent host observes at its next suspension point.
#[derive(Default)]
pub struct EmbeddedRunHost {
    runs: Mutex<HashMap<String, CancellationToken>>,
}

impl EmbeddedRunHost {
    /// Create an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run for a session under the given parent token and return
    /// the run's own token.
    ///
    /// A still-registered previous run for the same session is cancelled
    /// first — a session executes one embedded run at a time.
    pub async fn begin_run(&self, session_id: &str, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        let mut runs = self.runs.lock().await;
        if let Some(previous) = runs.insert(session_id.to_owned(), token.clone()) {
            previous.cancel();
            debug!(session_id, "cancelled superseded embedded run");
        }
        token
    }

    /// Deregister a completed run.
    pub async fn finish_run(&self, session_id: &str) {
        self.runs.lock().await.remove(session_id);
    }

    /// Abort the embedded run for a session, if one is live.
    ///
    /// Returns whether a run was actually aborted.
    pub async fn abort_run(&self, session_id: &str) -> bool {
        let mut runs = self.runs.lock().await;
        match runs.remove(session_id) {
            Some(token) => {
                token.cancel();
                info!(session_id, "embedded run aborted");
                true
            }
            None => false,
        }
    }

    /// Number of live embedded runs.
    pub async fn active_runs(&self) -> usize {
        self.runs.lock().await.len()
    }
}

/// Cooperative cancellation per process scope, independent of OS signals.
///
/// Every run started under a scope derives its token from the scope token,
/// so one `cancel_scope` reaches all of the scope's embedded work even when
/// the OS-level signals are ignored.
#[derive(Default)]
pub struct ProcessSupervisor {
    scopes: Mutex<HashMap<String, CancellationToken>>,
}

impl ProcessSupervisor {
    /// Create an empty supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the cancellation token for a scope.
    pub async fn scope_token(&self, scope_key: &str) -> CancellationToken {
        let mut scopes = self.scopes.lock().await;
        scopes
            .entry(scope_key.to_owned())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Request cooperative cancellation of everything under a scope.
    ///
    /// The scope's token is cancelled and dropped; the next run under the
    /// same scope gets a fresh token.
    pub async fn cancel_scope(&self, scope_key: &str, reason: &str) {
        let mut scopes = self.scopes.lock().await;
        if let Some(token) = scopes.remove(scope_key) {
            token.cancel();
            info!(scope_key, reason, "scope cancelled");
        }
    }
}
