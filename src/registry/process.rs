//! Registry of OS child processes keyed by pid.
//!
//! Owns the `tokio::process::Child` handles so the hard-stop path can
//! force-kill and reap them. Children are spawned in their own process group
//! (Unix), so the force phase can take down the whole tree with one
//! `SIGKILL` to the group.

use std::collections::HashMap;
use std::process::ExitStatus;

use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::now_ms;
use crate::models::process::{KillOutcome, ProcessSession};
use crate::{AppError, Result};

/// One tracked child: the registry model plus the live handle.
struct TrackedProcess {
    session: ProcessSession,
    child: Option<Child>,
}

/// Registry of OS-level child processes, at most one entry per live pid.
#[derive(Default)]
pub struct ProcessRegistry {
    inner: Mutex<HashMap<u32, TrackedProcess>>,
}

impl ProcessRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly spawned child under a scope key, returning its pid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the child has no pid (it already
    /// exited before registration).
    pub async fn register(&self, scope_key: &str, child: Child) -> Result<u32> {
        let pid = child
            .id()
            .ok_or_else(|| AppError::Process("child exited before registration".into()))?;

        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.get(&pid) {
            if existing.session.alive {
                // Pid reuse against a live entry would break the
                // one-entry-per-live-pid invariant; the old entry must be a
                // stale record of a process the OS already recycled.
                warn!(pid, scope_key, "replacing live registry entry for reused pid");
            }
        }

        inner.insert(
            pid,
            TrackedProcess {
                session: ProcessSession {
                    pid,
                    scope_key: scope_key.to_owned(),
                    alive: true,
                    exit_reason: None,
                    started_at_ms: now_ms(),
                },
                child: Some(child),
            },
        );

        debug!(pid, scope_key, "process registered");
        Ok(pid)
    }

    /// Live pids registered under a scope.
    pub async fn list_scope(&self, scope_key: &str) -> Vec<u32> {
        let inner = self.inner.lock().await;
        inner
            .values()
            .filter(|t| t.session.alive && t.session.scope_key == scope_key)
            .map(|t| t.session.pid)
            .collect()
    }

    /// Total live processes across all scopes.
    pub async fn live_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.values().filter(|t| t.session.alive).count()
    }

    /// Request graceful termination of every live process in a scope.
    ///
    /// Returns the number of processes a signal was actually delivered to.
    /// Already-gone processes are marked exited and not counted.
    pub async fn signal_scope(&self, scope_key: &str) -> usize {
        let pids = self.list_scope(scope_key).await;
        let mut delivered = 0;
        for pid in pids {
            if self.signal_term(pid).await == KillOutcome::Delivered {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver a graceful termination signal to one process.
    pub async fn signal_term(&self, pid: u32) -> KillOutcome {
        let mut inner = self.inner.lock().await;
        let Some(tracked) = inner.get_mut(&pid) else {
            return KillOutcome::AlreadyGone;
        };
        if !tracked.session.alive {
            return KillOutcome::AlreadyGone;
        }

        #[cfg(unix)]
        {
            match unix_pid(pid) {
                Some(target) => {
                    match nix::sys::signal::kill(target, nix::sys::signal::Signal::SIGTERM) {
                        Ok(()) => KillOutcome::Delivered,
                        Err(nix::errno::Errno::ESRCH) => {
                            tracked.session.alive = false;
                            tracked.session.exit_reason = Some("exited".into());
                            KillOutcome::AlreadyGone
                        }
                        Err(err) => {
                            warn!(pid, %err, "SIGTERM delivery failed");
                            KillOutcome::AlreadyGone
                        }
                    }
                }
                None => KillOutcome::AlreadyGone,
            }
        }

        #[cfg(not(unix))]
        {
            // No graceful equivalent off Unix; fall through to a direct kill.
            match tracked.child.as_mut().map(Child::start_kill) {
                Some(Ok(())) => KillOutcome::Delivered,
                _ => KillOutcome::AlreadyGone,
            }
        }
    }

    /// Force-kill a process and its whole tree, no grace period.
    ///
    /// Marks the entry exited with reason `"killed"`. A pid that is already
    /// gone is an expected outcome, never an error.
    pub async fn force_kill_tree(&self, pid: u32) -> KillOutcome {
        let mut inner = self.inner.lock().await;
        let Some(tracked) = inner.get_mut(&pid) else {
            return KillOutcome::AlreadyGone;
        };
        if !tracked.session.alive {
            return KillOutcome::AlreadyGone;
        }

        let mut outcome = KillOutcome::AlreadyGone;

        #[cfg(unix)]
        if let Some(target) = unix_pid(pid) {
            // The child leads its own process group, so killing the group
            // takes grandchildren down with it.
            match nix::sys::signal::killpg(target, nix::sys::signal::Signal::SIGKILL) {
                Ok(()) => outcome = KillOutcome::Delivered,
                Err(nix::errno::Errno::ESRCH) => {}
                Err(err) => warn!(pid, %err, "SIGKILL delivery failed"),
            }
        }

        if let Some(child) = tracked.child.as_mut() {
            match child.start_kill() {
                Ok(()) => outcome = KillOutcome::Delivered,
                Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {
                    // Already reaped.
                }
                Err(err) => debug!(pid, %err, "child start_kill failed"),
            }
        }

        tracked.session.alive = false;
        tracked.session.exit_reason = Some("killed".into());
        debug!(pid, "process force-killed");
        outcome
    }

    /// Mark any of a scope's processes that have already exited, keeping
    /// their entries.
    ///
    /// Called between the graceful and forceful hard-stop phases so the
    /// force phase only sees processes that are actually still running.
    pub async fn poll_scope_exits(&self, scope_key: &str) {
        let mut inner = self.inner.lock().await;
        for tracked in inner.values_mut() {
            if !tracked.session.alive || tracked.session.scope_key != scope_key {
                continue;
            }
            if let Some(child) = tracked.child.as_mut() {
                if let Ok(Some(_)) = child.try_wait() {
                    tracked.session.alive = false;
                    tracked.session.exit_reason = Some("exited".into());
                }
            }
        }
    }

    /// Mark a process exited with the given reason.
    ///
    /// Returns whether a live entry was actually transitioned.
    pub async fn mark_exited(&self, pid: u32, reason: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(&pid) {
            Some(tracked) if tracked.session.alive => {
                tracked.session.alive = false;
                tracked.session.exit_reason = Some(reason.to_owned());
                true
            }
            _ => false,
        }
    }

    /// Poll all live children for exits, mark and drop finished entries.
    ///
    /// Returns `(pid, scope_key, exit_status)` for every reaped process.
    /// Entries already marked dead are pruned here as well, keeping the map
    /// bounded.
    pub async fn reap_exited(&self) -> Vec<(u32, String, Option<ExitStatus>)> {
        let mut inner = self.inner.lock().await;
        let mut reaped = Vec::new();

        for (pid, tracked) in inner.iter_mut() {
            if !tracked.session.alive {
                reaped.push((*pid, tracked.session.scope_key.clone(), None));
                continue;
            }
            let Some(child) = tracked.child.as_mut() else {
                continue;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracked.session.alive = false;
                    tracked.session.exit_reason = Some("exited".into());
                    reaped.push((*pid, tracked.session.scope_key.clone(), Some(status)));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(pid, %err, "failed to poll child process status");
                    tracked.session.alive = false;
                    tracked.session.exit_reason = Some("poll_failed".into());
                    reaped.push((*pid, tracked.session.scope_key.clone(), None));
                }
            }
        }

        for (pid, _, _) in &reaped {
            inner.remove(pid);
        }

        reaped
    }

    /// Snapshot of all entries, live and exited.
    pub async fn snapshot(&self) -> Vec<ProcessSession> {
        let inner = self.inner.lock().await;
        inner.values().map(|t| t.session.clone()).collect()
    }
}

#[cfg(unix)]
fn unix_pid(pid: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(pid).ok().map(nix::unistd::Pid::from_raw)
}
