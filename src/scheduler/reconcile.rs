//! Desired-vs-actual job convergence.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::cron::{CronService, RemoveOutcome};
use crate::models::cron::{CronJob, SchedulerJobRef};
use crate::models::now_ms;
use crate::persistence::scheduler_state::SchedulerState;
use crate::Result;

use super::desired::DesiredJob;

/// Counters from one convergence pass.
#[derive(Debug, Clone, Default)]
pub struct ConvergeStats {
    /// Jobs created.
    pub created: usize,
    /// Jobs patched to match the desired spec.
    pub patched: usize,
    /// Stale jobs deleted.
    pub deleted: usize,
    /// Duplicate-name anomalies removed.
    pub duplicates_removed: usize,
    /// Per-job failures that did not abort the pass.
    pub errors: Vec<String>,
}

impl ConvergeStats {
    /// Whether the pass issued any mutating call.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created + self.patched + self.deleted + self.duplicates_removed > 0
    }
}

/// Converge the external daemon's jobs onto the desired set and refresh the
/// key→id bindings in `state`.
///
/// Works from one consistent `list` snapshot per pass; concurrent external
/// mutations between list and convergence are self-healed on a later tick,
/// not raced against. Per-job failures are collected into
/// [`ConvergeStats::errors`] so one broken job never blocks convergence of
/// the rest.
///
/// # Errors
///
/// Returns `AppError::Cron` only when the initial job listing fails —
/// without it, nothing can be diffed.
pub async fn reconcile_jobs(
    cron: &dyn CronService,
    state: &mut SchedulerState,
    desired: &[DesiredJob],
    prefix: &str,
) -> Result<ConvergeStats> {
    let mut stats = ConvergeStats::default();

    // One consistent snapshot, filtered to this reconciler's namespace.
    let actual: Vec<CronJob> = cron
        .list(true)
        .await?
        .into_iter()
        .filter(|job| job.spec.name.starts_with(prefix))
        .collect();

    let mut by_name: HashMap<String, Vec<CronJob>> = HashMap::new();
    for job in actual {
        by_name.entry(job.spec.name.clone()).or_default().push(job);
    }

    let now = now_ms();
    let mut new_refs: HashMap<String, SchedulerJobRef> = HashMap::new();

    for job in desired {
        let converged_id = match by_name.remove(&job.spec.name) {
            None => match cron.add(job.spec.clone()).await {
                Ok(id) => {
                    stats.created += 1;
                    Some(id)
                }
                Err(err) => {
                    warn!(name = %job.spec.name, %err, "failed to create job");
                    stats.errors.push(err.to_string());
                    None
                }
            },
            Some(mut matches) => {
                // Duplicate names should not occur; keep the
                // lexicographically-first id and delete the rest.
                matches.sort_by(|a, b| a.id.cmp(&b.id));
                let kept = matches.remove(0);
                for duplicate in matches {
                    warn!(
                        name = %duplicate.spec.name,
                        id = %duplicate.id,
                        "removing duplicate job"
                    );
                    match cron.remove(&duplicate.id).await {
                        Ok(_) => stats.duplicates_removed += 1,
                        Err(err) => {
                            warn!(id = %duplicate.id, %err, "failed to remove duplicate job");
                            stats.errors.push(err.to_string());
                        }
                    }
                }

                if kept.spec == job.spec {
                    Some(kept.id)
                } else {
                    match cron.update(&kept.id, job.spec.as_patch()).await {
                        Ok(()) => {
                            stats.patched += 1;
                            Some(kept.id)
                        }
                        Err(err) => {
                            warn!(name = %job.spec.name, %err, "failed to patch job");
                            stats.errors.push(err.to_string());
                            // The binding still points at a real job; keep it.
                            Some(kept.id)
                        }
                    }
                }
            }
        };

        match converged_id {
            Some(id) => {
                let job_ref = match state.job_refs.get(&job.key) {
                    // Unchanged binding: preserve its timestamps.
                    Some(existing) if existing.cron_job_id == id => existing.clone(),
                    Some(existing) => SchedulerJobRef {
                        cron_job_id: id,
                        created_at_ms: existing.created_at_ms,
                        updated_at_ms: now,
                    },
                    None => SchedulerJobRef {
                        cron_job_id: id,
                        created_at_ms: now,
                        updated_at_ms: now,
                    },
                };
                new_refs.insert(job.key.clone(), job_ref);
            }
            None => {
                // Creation failed; carry the old binding (if any) so its
                // run marker survives until the job can be re-created.
                if let Some(existing) = state.job_refs.get(&job.key) {
                    new_refs.insert(job.key.clone(), existing.clone());
                }
            }
        }
    }

    // Anything left under our prefix is no longer desired: garbage-collect.
    for (name, jobs) in by_name {
        for job in jobs {
            match cron.remove(&job.id).await {
                Ok(RemoveOutcome::Removed) => {
                    info!(%name, id = %job.id, "deleted stale job");
                    stats.deleted += 1;
                }
                Ok(RemoveOutcome::NotFound) => {}
                Err(err) => {
                    warn!(%name, id = %job.id, %err, "failed to delete stale job");
                    stats.errors.push(err.to_string());
                }
            }
        }
    }

    // Stale refs (key no longer desired) go together with their jobs, and
    // their run markers with them.
    state.job_refs = new_refs;
    let live_keys: std::collections::HashSet<String> = state.job_refs.keys().cloned().collect();
    state.run_markers.retain(|key, _| live_keys.contains(key));

    Ok(stats)
}
