//! Unit tests for desired-job computation.

use agent_switchboard::config::SchedulerConfig;
use agent_switchboard::models::cron::{CronSchedule, DeliveryMode, WakeMode};
use agent_switchboard::models::now_ms;
use agent_switchboard::persistence::planner_store::{PlannerState, WaitingItem};
use agent_switchboard::scheduler::{desired_jobs, job_prefix};

fn config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.agent = "main".into();
    config.namespace = "sched".into();
    config
}

#[test]
fn prefix_namespaces_by_agent() {
    let mut config = config();
    config.agent = "assistant".into();
    assert_eq!(job_prefix(&config), "sched:assistant:");
}

#[test]
fn reviews_are_always_desired_with_config_times() {
    let mut config = config();
    config.daily_review.hour = 7;
    config.daily_review.minute = 5;
    config.weekly_review.weekday = 1;
    config.weekly_review.hour = 9;
    config.weekly_review.minute = 0;
    config.horizons_review.day_of_month = 3;

    let jobs = desired_jobs(&config, &PlannerState::default());
    let daily = jobs.iter().find(|j| j.key == "review:daily").expect("daily");
    assert_eq!(daily.spec.name, "sched:main:review:daily");
    assert_eq!(
        daily.spec.schedule,
        CronSchedule::Cron {
            expr: "5 7 * * *".into()
        }
    );
    assert!(!daily.spec.delete_after_run);
    assert_eq!(daily.spec.wake_mode, WakeMode::NextHeartbeat);
    assert_eq!(daily.spec.delivery, DeliveryMode::Announce);

    let weekly = jobs.iter().find(|j| j.key == "review:weekly").expect("weekly");
    assert_eq!(
        weekly.spec.schedule,
        CronSchedule::Cron {
            expr: "0 9 * * 1".into()
        }
    );

    let horizons = jobs
        .iter()
        .find(|j| j.key == "review:horizons")
        .expect("horizons");
    assert_eq!(
        horizons.spec.schedule,
        CronSchedule::Cron {
            expr: "30 18 3 * *".into()
        }
    );
}

#[test]
fn calendar_sync_appears_only_when_enabled() {
    let mut config = config();
    assert!(!desired_jobs(&config, &PlannerState::default())
        .iter()
        .any(|j| j.key == "calendar:sync"));

    config.calendar_sync.enabled = true;
    config.calendar_sync.every_minutes = 10;
    let jobs = desired_jobs(&config, &PlannerState::default());
    let sync = jobs.iter().find(|j| j.key == "calendar:sync").expect("sync");
    assert_eq!(
        sync.spec.schedule,
        CronSchedule::Every { every_ms: 600_000 }
    );
    assert_eq!(sync.spec.delivery, DeliveryMode::Silent);
}

#[test]
fn each_waiting_item_gets_a_one_shot_job() {
    let config = config();
    let follow_up_at = now_ms() + 3_600_000;
    let planner = PlannerState {
        waiting: vec![WaitingItem {
            id: "w-42".into(),
            title: "invoice".into(),
            target: Some("+49123".into()),
            follow_up_at_ms: follow_up_at,
            cadence_hours: None,
            created_at_ms: now_ms(),
        }],
        actions: Vec::new(),
    };

    let jobs = desired_jobs(&config, &planner);
    let followup = jobs
        .iter()
        .find(|j| j.key == "followup:w-42")
        .expect("followup job");
    assert_eq!(followup.spec.name, "sched:main:followup:w-42");
    assert_eq!(
        followup.spec.schedule,
        CronSchedule::At {
            at_ms: follow_up_at
        }
    );
    assert!(followup.spec.delete_after_run);
    assert_eq!(followup.spec.wake_mode, WakeMode::Now);
    assert_eq!(followup.spec.payload["itemId"], serde_json::json!("w-42"));
}

#[test]
fn desired_set_is_a_pure_function_of_inputs() {
    let config = config();
    let planner = PlannerState::default();
    assert_eq!(
        desired_jobs(&config, &planner),
        desired_jobs(&config, &planner)
    );
}
