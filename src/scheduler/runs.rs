//! Exactly-once processing of observed job firings.

use tracing::{info, warn};

use crate::cron::CronService;
use crate::models::cron::CronRunStatus;
use crate::persistence::scheduler_state::SchedulerState;

use super::effects::EffectRouter;

/// Counters from one run-processing pass.
#[derive(Debug, Clone, Default)]
pub struct RunProcessStats {
    /// Firings handed to an effect handler.
    pub processed: usize,
    /// Firings skipped because their status was not success.
    pub skipped: usize,
    /// Effect or RPC failures (markers still advance on observation).
    pub errors: Vec<String>,
}

/// Process each tracked job's newest firing at most once.
///
/// A firing is processed when its timestamp is newer than the job key's
/// last-processed marker and its status is success. The marker advances on
/// *observation*, not on handler success — a handler that always errors is
/// logged once per firing instead of reprocessed forever. Non-success
/// firings advance nothing, so a later retry of the same firing by the
/// external daemon is still picked up.
///
/// Returns `true` when any marker advanced.
pub async fn process_triggered_runs(
    cron: &dyn CronService,
    state: &mut SchedulerState,
    effects: &EffectRouter,
) -> RunProcessStats {
    let mut stats = RunProcessStats::default();

    let refs: Vec<(String, String)> = state
        .job_refs
        .iter()
        .map(|(key, job_ref)| (key.clone(), job_ref.cron_job_id.clone()))
        .collect();

    for (key, cron_job_id) in refs {
        let entries = match cron.runs(&cron_job_id, 1).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(key, %err, "failed to fetch job runs");
                stats.errors.push(err.to_string());
                continue;
            }
        };

        let Some(latest) = entries.into_iter().max_by_key(|entry| entry.started_at_ms) else {
            continue;
        };

        let marker = state.run_markers.get(&key).copied().unwrap_or(i64::MIN);
        if latest.started_at_ms <= marker {
            continue;
        }

        match latest.status {
            CronRunStatus::Success => {
                info!(key, started_at_ms = latest.started_at_ms, "processing job firing");
                if let Err(err) = effects.handle(&key).await {
                    warn!(key, %err, "job effect failed");
                    stats.errors.push(err.to_string());
                }
                state.run_markers.insert(key, latest.started_at_ms);
                stats.processed += 1;
            }
            CronRunStatus::Error | CronRunStatus::Skipped => {
                warn!(
                    key,
                    status = ?latest.status,
                    error = latest.error.as_deref().unwrap_or(""),
                    "job firing did not succeed; leaving marker untouched"
                );
                stats.skipped += 1;
            }
        }
    }

    stats
}
