//! Cron-style reconciliation scheduler.
//!
//! A periodic tick diffs the desired set of timed jobs (a pure function of
//! config and planner state) against the external cron daemon's actual
//! jobs, converges the daemon onto the desired set, and processes each
//! observed job firing exactly once. Ticks never overlap: a tick still in
//! flight makes the next timer firing a no-op (skipped, not queued), and a
//! tick failure is recorded in durable state rather than crashing the loop.

pub mod desired;
pub mod effects;
pub mod reconcile;
pub mod runs;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::GlobalConfig;
use crate::cron::CronService;
use crate::persistence::planner_store::PlannerStore;
use crate::persistence::scheduler_state::SchedulerStateStore;

pub use desired::{desired_jobs, job_prefix, DesiredJob};
pub use effects::EffectRouter;
pub use reconcile::{reconcile_jobs, ConvergeStats};
pub use runs::{process_triggered_runs, RunProcessStats};

/// The reconciliation loop.
pub struct SchedulerReconciler {
    config: Arc<GlobalConfig>,
    cron: Arc<dyn CronService>,
    store: SchedulerStateStore,
    planner: Arc<PlannerStore>,
    effects: EffectRouter,
    in_flight: AtomicBool,
}

impl SchedulerReconciler {
    /// Assemble a reconciler over its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        cron: Arc<dyn CronService>,
        store: SchedulerStateStore,
        planner: Arc<PlannerStore>,
        effects: EffectRouter,
    ) -> Self {
        Self {
            config,
            cron,
            store,
            planner,
            effects,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Spawn the tick loop on its own timer.
    #[must_use]
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let tick_interval = Duration::from_secs(self.config.scheduler.tick_seconds);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("scheduler reconciler shutting down");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                self.tick().await;
            }
        })
    }

    /// Run one reconciliation tick.
    ///
    /// Re-entrancy is guarded by a boolean, not a queue — a tick that is
    /// still running simply makes this call a no-op.
    pub async fn tick(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("previous tick still running; skipping");
            return;
        }

        self.tick_inner()
            .instrument(info_span!("scheduler_tick", agent = %self.config.scheduler.agent))
            .await;

        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn tick_inner(&self) {
        let mut state = self.store.load();
        let previous = state.clone();
        let mut errors: Vec<String> = Vec::new();

        // ── Converge desired vs. actual jobs ─────────────────
        match self.planner.load() {
            Ok(planner_state) => {
                let desired = desired_jobs(&self.config.scheduler, &planner_state);
                let prefix = job_prefix(&self.config.scheduler);
                match reconcile_jobs(self.cron.as_ref(), &mut state, &desired, &prefix).await {
                    Ok(stats) => {
                        if stats.changed() {
                            info!(
                                created = stats.created,
                                patched = stats.patched,
                                deleted = stats.deleted,
                                duplicates_removed = stats.duplicates_removed,
                                "scheduler converged"
                            );
                        }
                        errors.extend(stats.errors);
                    }
                    Err(err) => {
                        error!(%err, "job reconciliation failed");
                        errors.push(err.to_string());
                    }
                }
            }
            Err(err) => {
                error!(%err, "cannot load planner state; skipping convergence");
                errors.push(err.to_string());
            }
        }

        // ── Process newly observed firings exactly once ──────
        let run_stats = process_triggered_runs(self.cron.as_ref(), &mut state, &self.effects).await;
        errors.extend(run_stats.errors);

        state.last_error = errors.first().cloned();

        // One persist per tick, and only when something changed.
        if state != previous {
            if let Err(err) = self.store.save(&state) {
                error!(%err, "failed to persist scheduler state");
            }
        }
    }
}
