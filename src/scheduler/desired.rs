//! Desired-job computation: a pure function of config and planner state.

use serde_json::json;

use crate::config::SchedulerConfig;
use crate::models::cron::{CronJobSpec, CronSchedule, DeliveryMode, WakeMode};
use crate::persistence::planner_store::PlannerState;

/// One desired job: the internal key plus the full spec the external
/// daemon should hold for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredJob {
    /// Internal job key (`review:daily`, `followup:<id>`, …).
    pub key: String,
    /// The spec the daemon should converge onto.
    pub spec: CronJobSpec,
}

/// Job-name prefix for this reconciler instance.
///
/// Namespacing prevents cross-agent and cross-subsystem collisions: the
/// reconciler only ever lists, patches, or deletes jobs under its own
/// prefix.
#[must_use]
pub fn job_prefix(config: &SchedulerConfig) -> String {
    format!("{}:{}:", config.namespace, config.agent)
}

/// Compute the full desired job set.
///
/// Fixed recurring jobs (reviews, calendar sync) come from config; dynamic
/// one-shot jobs come from mutable planner state — one follow-up job per
/// active waiting item, scheduled at its follow-up time and removed by the
/// daemon after firing.
#[must_use]
pub fn desired_jobs(config: &SchedulerConfig, planner: &PlannerState) -> Vec<DesiredJob> {
    let prefix = job_prefix(config);
    let mut jobs = Vec::new();

    let review = |key: &str, expr: String, period: &str| DesiredJob {
        key: key.to_owned(),
        spec: CronJobSpec {
            name: format!("{prefix}{key}"),
            enabled: true,
            delete_after_run: false,
            schedule: CronSchedule::Cron { expr },
            session_target: config.session_target.clone(),
            wake_mode: WakeMode::NextHeartbeat,
            payload: json!({ "kind": "review", "period": period }),
            delivery: DeliveryMode::Announce,
        },
    };

    jobs.push(review(
        "review:daily",
        format!(
            "{} {} * * *",
            config.daily_review.minute, config.daily_review.hour
        ),
        "daily",
    ));
    jobs.push(review(
        "review:weekly",
        format!(
            "{} {} * * {}",
            config.weekly_review.minute, config.weekly_review.hour, config.weekly_review.weekday
        ),
        "weekly",
    ));
    jobs.push(review(
        "review:horizons",
        format!(
            "{} {} {} * *",
            config.horizons_review.minute,
            config.horizons_review.hour,
            config.horizons_review.day_of_month
        ),
        "horizons",
    ));

    if config.calendar_sync.enabled {
        jobs.push(DesiredJob {
            key: "calendar:sync".to_owned(),
            spec: CronJobSpec {
                name: format!("{prefix}calendar:sync"),
                enabled: true,
                delete_after_run: false,
                schedule: CronSchedule::Every {
                    every_ms: i64::from(config.calendar_sync.every_minutes) * 60_000,
                },
                session_target: config.session_target.clone(),
                wake_mode: WakeMode::NextHeartbeat,
                payload: json!({ "kind": "calendar_sync" }),
                delivery: DeliveryMode::Silent,
            },
        });
    }

    for item in &planner.waiting {
        let key = format!("followup:{}", item.id);
        jobs.push(DesiredJob {
            spec: CronJobSpec {
                name: format!("{prefix}{key}"),
                enabled: true,
                delete_after_run: true,
                schedule: CronSchedule::At {
                    at_ms: item.follow_up_at_ms,
                },
                session_target: config.session_target.clone(),
                wake_mode: WakeMode::Now,
                payload: json!({
                    "kind": "followup",
                    "itemId": item.id,
                    "title": item.title,
                    "target": item.target,
                }),
                delivery: DeliveryMode::Announce,
            },
            key,
        });
    }

    jobs
}
