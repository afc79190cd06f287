//! Shared helpers for integration tests: config construction, gateway
//! wiring, and an in-memory cron daemon fake.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use agent_switchboard::config::GlobalConfig;
use agent_switchboard::cron::{CronService, RemoveOutcome};
use agent_switchboard::gateway::dispatcher::{Dispatcher, GatewayDeps};
use agent_switchboard::gateway::reply_queue::ReplyQueue;
use agent_switchboard::gateway::run_host::{EmbeddedRunHost, ProcessSupervisor};
use agent_switchboard::models::cron::{
    CronJob, CronJobPatch, CronJobSpec, CronRunEntry, CronRunStatus,
};
use agent_switchboard::models::transcript::TranscriptMessage;
use agent_switchboard::persistence::run_log::RunLog;
use agent_switchboard::persistence::session_store::SessionStore;
use agent_switchboard::persistence::transcript;
use agent_switchboard::registry::{ProcessRegistry, SubagentRegistry};
use agent_switchboard::scheduler::effects::{CalendarSync, FollowUpSender};
use agent_switchboard::{AppError, Result};

/// Build a validated `GlobalConfig` rooted in `state_dir` with a short
/// escalation window and the given host CLI.
pub fn test_config(state_dir: &Path, host_cli: &str, host_cli_args: &[&str]) -> GlobalConfig {
    let args = host_cli_args
        .iter()
        .map(|arg| format!("\"{arg}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"
state_dir = '{root}'

[gateway]
host_cli = "{host_cli}"
host_cli_args = [{args}]
escalation_ms = 100
"#,
        root = state_dir.to_str().expect("utf8 path"),
    );
    GlobalConfig::from_toml_str(&toml).expect("valid test config")
}

/// Assemble the full gateway wiring over a config.
pub fn build_gateway(config: GlobalConfig) -> (Arc<GatewayDeps>, Arc<Dispatcher>) {
    let config = Arc::new(config);
    let deps = Arc::new(GatewayDeps {
        config: Arc::clone(&config),
        processes: Arc::new(ProcessRegistry::new()),
        subagents: Arc::new(SubagentRegistry::new()),
        run_host: Arc::new(EmbeddedRunHost::new()),
        supervisor: Arc::new(ProcessSupervisor::new()),
        replies: Arc::new(ReplyQueue::new()),
        run_log: Arc::new(RunLog::new(config.runs_file())),
        sessions: Arc::new(SessionStore::new(config.sessions_file())),
    });
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&deps)));
    (deps, dispatcher)
}

/// Bind a session and write a transcript ending with the given messages.
pub fn seed_session(
    deps: &GatewayDeps,
    session_key: &str,
    session_id: &str,
    messages: &[TranscriptMessage],
) {
    let session_file = deps
        .config
        .transcripts_dir()
        .join(format!("{session_id}.jsonl"));
    deps.sessions
        .bind(session_key, session_id, session_file.clone())
        .expect("bind session");
    for message in messages {
        transcript::append_message(&session_file, message).expect("append transcript");
    }
}

/// Poll an async predicate until it holds or the timeout elapses.
pub async fn wait_until<F, Fut>(timeout_ms: u64, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    loop {
        if predicate().await {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
}

// ── In-memory cron daemon fake ───────────────────────────────────────────────

/// Mutation counters for asserting convergence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CronCalls {
    pub add: usize,
    pub update: usize,
    pub remove: usize,
    pub list: usize,
    pub runs: usize,
}

#[derive(Default)]
struct FakeCronInner {
    jobs: Vec<CronJob>,
    runs: HashMap<String, Vec<CronRunEntry>>,
    next_id: u64,
    calls: CronCalls,
}

/// In-memory stand-in for the external cron daemon.
#[derive(Default)]
pub struct FakeCronService {
    inner: Mutex<FakeCronInner>,
}

impl FakeCronService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job with an explicit id (for duplicate-anomaly tests).
    pub async fn seed_job(&self, id: &str, spec: CronJobSpec) {
        let mut inner = self.inner.lock().await;
        inner.jobs.push(CronJob {
            id: id.to_owned(),
            spec,
        });
    }

    /// Seed a run record for a job id.
    pub async fn seed_run(&self, job_id: &str, started_at_ms: i64, status: CronRunStatus) {
        let mut inner = self.inner.lock().await;
        inner.runs.entry(job_id.to_owned()).or_default().push(CronRunEntry {
            started_at_ms,
            status,
            error: None,
        });
    }

    /// Current jobs, sorted by name for stable assertions.
    pub async fn jobs(&self) -> Vec<CronJob> {
        let mut jobs = self.inner.lock().await.jobs.clone();
        jobs.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        jobs
    }

    /// Mutation counters so far.
    pub async fn calls(&self) -> CronCalls {
        self.inner.lock().await.calls
    }

    /// Reset mutation counters (e.g., between reconciliation passes).
    pub async fn reset_calls(&self) {
        self.inner.lock().await.calls = CronCalls::default();
    }
}

impl CronService for FakeCronService {
    fn add(&self, spec: CronJobSpec) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.add += 1;
            inner.next_id += 1;
            let id = format!("job-{:04}", inner.next_id);
            inner.jobs.push(CronJob {
                id: id.clone(),
                spec,
            });
            Ok(id)
        })
    }

    fn update(
        &self,
        id: &str,
        patch: CronJobPatch,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.update += 1;
            let job = inner
                .jobs
                .iter_mut()
                .find(|job| job.id == id)
                .ok_or_else(|| AppError::Cron(format!("no job {id}")))?;
            if let Some(name) = patch.name {
                job.spec.name = name;
            }
            if let Some(enabled) = patch.enabled {
                job.spec.enabled = enabled;
            }
            if let Some(delete_after_run) = patch.delete_after_run {
                job.spec.delete_after_run = delete_after_run;
            }
            if let Some(schedule) = patch.schedule {
                job.spec.schedule = schedule;
            }
            if let Some(session_target) = patch.session_target {
                job.spec.session_target = session_target;
            }
            if let Some(wake_mode) = patch.wake_mode {
                job.spec.wake_mode = wake_mode;
            }
            if let Some(payload) = patch.payload {
                job.spec.payload = payload;
            }
            if let Some(delivery) = patch.delivery {
                job.spec.delivery = delivery;
            }
            Ok(())
        })
    }

    fn remove(&self, id: &str) -> Pin<Box<dyn Future<Output = Result<RemoveOutcome>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.remove += 1;
            let before = inner.jobs.len();
            inner.jobs.retain(|job| job.id != id);
            if inner.jobs.len() == before {
                Ok(RemoveOutcome::NotFound)
            } else {
                inner.runs.remove(&id);
                Ok(RemoveOutcome::Removed)
            }
        })
    }

    fn list(
        &self,
        _include_disabled: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CronJob>>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.list += 1;
            Ok(inner.jobs.clone())
        })
    }

    fn runs(
        &self,
        id: &str,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CronRunEntry>>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.calls.runs += 1;
            let mut entries = inner.runs.get(&id).cloned().unwrap_or_default();
            entries.sort_by_key(|entry| std::cmp::Reverse(entry.started_at_ms));
            entries.truncate(limit as usize);
            Ok(entries)
        })
    }
}

// ── Effect collaborator fakes ────────────────────────────────────────────────

/// Follow-up sender that records deliveries.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl FollowUpSender for RecordingSender {
    fn send(
        &self,
        target: &str,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let target = target.to_owned();
        let text = text.to_owned();
        Box::pin(async move {
            self.sent.lock().await.push((target, text));
            Ok(())
        })
    }
}

/// Follow-up sender that always fails.
pub struct FailingSender;

impl FollowUpSender for FailingSender {
    fn send(&self, _: &str, _: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Err(AppError::Channel("send rejected".into())) })
    }
}

/// Calendar bridge that always fails.
pub struct FailingCalendar;

impl CalendarSync for FailingCalendar {
    fn sync(&self) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        Box::pin(async { Err(AppError::Channel("calendar bridge down".into())) })
    }
}

