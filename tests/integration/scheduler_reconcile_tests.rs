//! Integration tests for desired-vs-actual job convergence against the
//! in-memory cron daemon fake.

use agent_switchboard::config::SchedulerConfig;
use agent_switchboard::models::cron::CronSchedule;
use agent_switchboard::persistence::planner_store::PlannerState;
use agent_switchboard::persistence::scheduler_state::SchedulerState;
use agent_switchboard::scheduler::{desired_jobs, job_prefix, reconcile_jobs};

use super::test_helpers::FakeCronService;

fn config() -> SchedulerConfig {
    SchedulerConfig::default()
}

#[tokio::test]
async fn first_pass_creates_all_desired_jobs() {
    let cron = FakeCronService::new();
    let config = config();
    let desired = desired_jobs(&config, &PlannerState::default());
    let mut state = SchedulerState::default();

    let stats = reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("reconcile");

    assert_eq!(stats.created, 3, "three recurring reviews");
    assert_eq!(stats.patched, 0);
    assert_eq!(stats.deleted, 0);
    assert!(stats.errors.is_empty());
    assert_eq!(cron.jobs().await.len(), 3);
    assert_eq!(state.job_refs.len(), 3);
}

#[tokio::test]
async fn reconciliation_is_convergent() {
    let cron = FakeCronService::new();
    let config = config();
    let desired = desired_jobs(&config, &PlannerState::default());
    let mut state = SchedulerState::default();

    reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("first pass");
    cron.reset_calls().await;

    let stats = reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("second pass");

    // The second pass must issue zero mutating calls.
    assert_eq!(stats.created + stats.patched + stats.deleted + stats.duplicates_removed, 0);
    let calls = cron.calls().await;
    assert_eq!(calls.add, 0);
    assert_eq!(calls.update, 0);
    assert_eq!(calls.remove, 0);
}

#[tokio::test]
async fn drifted_jobs_are_patched_in_place() {
    let cron = FakeCronService::new();
    let mut config = config();
    let mut state = SchedulerState::default();

    let desired = desired_jobs(&config, &PlannerState::default());
    reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("first pass");
    let id_before = state.job_refs["review:daily"].cron_job_id.clone();
    let created_at_before = state.job_refs["review:daily"].created_at_ms;

    // Config change moves the daily review time: same name, new schedule.
    config.daily_review.hour = 6;
    let desired = desired_jobs(&config, &PlannerState::default());
    let stats = reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("second pass");

    assert_eq!(stats.patched, 1);
    assert_eq!(stats.created, 0);

    let jobs = cron.jobs().await;
    let daily = jobs
        .iter()
        .find(|j| j.spec.name.ends_with("review:daily"))
        .expect("daily job");
    assert_eq!(
        daily.spec.schedule,
        CronSchedule::Cron {
            expr: "30 6 * * *".into()
        }
    );

    // Patch in place: binding id unchanged, created_at preserved.
    assert_eq!(state.job_refs["review:daily"].cron_job_id, id_before);
    assert_eq!(state.job_refs["review:daily"].created_at_ms, created_at_before);
}

#[tokio::test]
async fn stale_jobs_are_garbage_collected() {
    let cron = FakeCronService::new();
    let config = config();
    let mut state = SchedulerState::default();

    // A job under our prefix that is no longer desired.
    let mut orphan = desired_jobs(&config, &PlannerState::default())[0].spec.clone();
    orphan.name = format!("{}followup:gone", job_prefix(&config));
    cron.seed_job("job-stale", orphan).await;

    // A foreign job outside the namespace must never be touched.
    let mut foreign = desired_jobs(&config, &PlannerState::default())[0].spec.clone();
    foreign.name = "other:agent:review:daily".into();
    cron.seed_job("job-foreign", foreign).await;

    let desired = desired_jobs(&config, &PlannerState::default());
    let stats = reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("reconcile");

    assert_eq!(stats.deleted, 1);
    let jobs = cron.jobs().await;
    assert!(jobs.iter().any(|j| j.id == "job-foreign"));
    assert!(!jobs.iter().any(|j| j.id == "job-stale"));
}

#[tokio::test]
async fn duplicate_names_keep_the_lexicographically_first_id() {
    let cron = FakeCronService::new();
    let config = config();
    let mut state = SchedulerState::default();

    let desired = desired_jobs(&config, &PlannerState::default());
    let daily_spec = desired
        .iter()
        .find(|j| j.key == "review:daily")
        .expect("daily")
        .spec
        .clone();

    // Anomaly: two jobs with the same name.
    cron.seed_job("job-bbb", daily_spec.clone()).await;
    cron.seed_job("job-aaa", daily_spec).await;

    let stats = reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("reconcile");

    assert_eq!(stats.duplicates_removed, 1);
    assert_eq!(state.job_refs["review:daily"].cron_job_id, "job-aaa");
    let jobs = cron.jobs().await;
    assert!(!jobs.iter().any(|j| j.id == "job-bbb"));
}

#[tokio::test]
async fn resolved_waiting_item_removes_its_job_and_marker() {
    let cron = FakeCronService::new();
    let config = config();
    let mut state = SchedulerState::default();

    let planner = PlannerState {
        waiting: vec![agent_switchboard::persistence::planner_store::WaitingItem {
            id: "w1".into(),
            title: "invoice".into(),
            target: None,
            follow_up_at_ms: 1_000,
            cadence_hours: None,
            created_at_ms: 1,
        }],
        actions: Vec::new(),
    };

    let desired = desired_jobs(&config, &planner);
    reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("first pass");
    assert!(state.job_refs.contains_key("followup:w1"));
    state.run_markers.insert("followup:w1".into(), 42);

    // The item is resolved: its job disappears from the desired set.
    let desired = desired_jobs(&config, &PlannerState::default());
    let stats = reconcile_jobs(&cron, &mut state, &desired, &job_prefix(&config))
        .await
        .expect("second pass");

    assert_eq!(stats.deleted, 1);
    assert!(!state.job_refs.contains_key("followup:w1"));
    assert!(!state.run_markers.contains_key("followup:w1"));
    assert_eq!(cron.jobs().await.len(), 3);
}
