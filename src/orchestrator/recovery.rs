//! Crash recovery of interrupted runs.
//!
//! On process startup every persisted in-flight run is inspected and either
//! expired (too old, too many attempts), dropped (its transcript shows the
//! run already reached a terminal turn), or resumed through a caller-
//! supplied callback. All store mutations from one pass are flushed in a
//! single rewrite at the end, so a crash mid-batch loses at most one batch
//! of bookkeeping and never corrupts partial state.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::models::now_ms;
use crate::models::run::{PersistedRun, RunSource};
use crate::persistence::run_log::RunLog;
use crate::persistence::session_store::SessionStore;
use crate::persistence::transcript;
use crate::Result;

/// Runs older than this are expired without resuming. Age is measured from
/// first registration, never from the last update — a run that keeps
/// getting retried does not get an extended lease on wall-clock age.
pub const MAX_RUN_AGE_MS: i64 = 2 * 60 * 60 * 1000;

/// Runs resumed this many times are expired instead of retried again.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Scope filter for one recovery pass.
///
/// Independent subsystems (chat dispatch vs. WhatsApp auto-reply) recover
/// only their own runs by filtering on source and account, without
/// touching each other's entries.
#[derive(Debug, Clone, Default)]
pub struct RecoveryFilter {
    /// Only consider runs from this source.
    pub source: Option<RunSource>,
    /// Only consider runs owned by this account.
    pub account_id: Option<String>,
}

/// Counters from one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries matching the filter.
    pub scanned: usize,
    /// Entries handed to the resume callback that accepted them.
    pub resumed: usize,
    /// Entries deleted for exceeding max age or max attempts.
    pub expired: usize,
    /// Entries deleted because their transcript shows a terminal turn (or
    /// no resolvable session at all).
    pub dropped: usize,
    /// Entries the resume callback declined (kept for a later pass).
    pub declined: usize,
    /// Entries whose resume callback failed (kept for a later pass).
    pub failed: usize,
}

/// Scan the run log and resume every interrupted run that warrants it.
///
/// The `resume` callback receives the already-bumped entry. Returning
/// `Ok(true)` means the run was re-dispatched (its record stays until the
/// normal completion path clears it); `Ok(false)` or an error keeps the
/// entry as-is for a future pass — the attempt counter was already
/// incremented, so a permanently failing resume is bounded by
/// [`MAX_RECOVERY_ATTEMPTS`] without requiring the callback to be
/// idempotent against infinite retries.
pub async fn recover_interrupted_runs<F, Fut>(
    run_log: &RunLog,
    sessions: &SessionStore,
    filter: &RecoveryFilter,
    resume: F,
) -> RecoveryReport
where
    F: Fn(PersistedRun) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut runs = run_log.load();
    let now = now_ms();
    let mut report = RecoveryReport::default();
    let mut removals: Vec<String> = Vec::new();
    let mut mutated = false;

    let run_ids: Vec<String> = runs.keys().cloned().collect();
    for run_id in run_ids {
        let Some(entry) = runs.get(&run_id).cloned() else {
            continue;
        };

        if let Some(source) = filter.source {
            if entry.source != source {
                continue;
            }
        }
        if let Some(ref account_id) = filter.account_id {
            if entry.account_id.as_deref() != Some(account_id.as_str()) {
                continue;
            }
        }
        report.scanned += 1;

        // Age is checked before the attempt count.
        if entry.age_ms(now) > MAX_RUN_AGE_MS {
            info!(run_id, age_ms = entry.age_ms(now), "expiring stale in-flight run");
            removals.push(run_id);
            report.expired += 1;
            continue;
        }
        if entry.recovery_attempts >= MAX_RECOVERY_ATTEMPTS {
            info!(
                run_id,
                attempts = entry.recovery_attempts,
                "expiring run past max recovery attempts"
            );
            removals.push(run_id);
            report.expired += 1;
            continue;
        }

        if !should_resume_from_transcript(sessions, &entry.session_key) {
            debug!(run_id, session_key = %entry.session_key, "run already terminal; dropping");
            removals.push(run_id);
            report.dropped += 1;
            continue;
        }

        let mut bumped = entry;
        bumped.recovery_attempts += 1;
        bumped.last_recovery_at_ms = Some(now);
        bumped.updated_at_ms = now;
        runs.insert(run_id.clone(), bumped.clone());
        mutated = true;

        match resume(bumped).await {
            Ok(true) => report.resumed += 1,
            Ok(false) => {
                debug!(run_id, "resume declined; keeping entry for a later pass");
                report.declined += 1;
            }
            Err(err) => {
                warn!(run_id, %err, "resume failed; keeping entry for a later pass");
                report.failed += 1;
            }
        }
    }

    for run_id in &removals {
        runs.remove(run_id);
    }

    // One batched rewrite for the whole pass.
    if mutated || !removals.is_empty() {
        if let Err(err) = run_log.save(&runs) {
            warn!(%err, "failed to flush run log after recovery pass");
        }
    }

    info!(
        scanned = report.scanned,
        resumed = report.resumed,
        expired = report.expired,
        dropped = report.dropped,
        declined = report.declined,
        failed = report.failed,
        "recovery pass complete"
    );

    report
}

/// Decide from the session's transcript whether an interrupted run should
/// be resumed.
///
/// No resolvable session binding, no transcript, or no messages all mean
/// "do not resume". Otherwise the decision is
/// [`TranscriptMessage::warrants_resume`](crate::models::transcript::TranscriptMessage::warrants_resume)
/// over the last message.
#[must_use]
pub fn should_resume_from_transcript(sessions: &SessionStore, session_key: &str) -> bool {
    let Ok(Some(binding)) = sessions.lookup(session_key) else {
        return false;
    };
    transcript::read_last_message(&binding.session_file)
        .is_some_and(|message| message.warrants_resume())
}
