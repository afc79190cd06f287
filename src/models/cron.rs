//! External cron service job and run models.
//!
//! These mirror the wire shape of the remote cron daemon the scheduler
//! reconciles against. The comparable fields used for desired-vs-actual
//! diffing all live on [`CronJobSpec`], so structural equality on the spec
//! is the convergence test.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// When a scheduled job fires relative to the agent lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WakeMode {
    /// Deliver on the agent's next natural wakeup.
    NextHeartbeat,
    /// Wake the agent immediately.
    Now,
}

/// How a job firing is surfaced to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Post the outcome into the session's reply lane.
    Announce,
    /// Process without user-visible output.
    Silent,
}

/// Job schedule, one of the three kinds the cron daemon accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CronSchedule {
    /// Five-field cron expression, evaluated in the daemon's timezone.
    Cron {
        /// The cron expression.
        expr: String,
    },
    /// Fixed repeat interval.
    Every {
        /// Interval between firings, milliseconds.
        every_ms: i64,
    },
    /// One-shot firing at an absolute time.
    At {
        /// Firing time, epoch milliseconds.
        at_ms: i64,
    },
}

/// Full job description sent on create and compared during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CronJobSpec {
    /// Namespaced job name (`<namespace>:<agent>:<key>`).
    pub name: String,
    /// Whether the job is armed.
    pub enabled: bool,
    /// Whether the daemon removes the job after its first firing.
    pub delete_after_run: bool,
    /// Firing schedule.
    pub schedule: CronSchedule,
    /// Session the firing is delivered to.
    pub session_target: String,
    /// Wake behavior on firing.
    pub wake_mode: WakeMode,
    /// Opaque payload handed back on each firing.
    pub payload: Value,
    /// User-visibility of the firing.
    pub delivery: DeliveryMode,
}

impl CronJobSpec {
    /// Full-field patch that converges an existing job onto this spec.
    #[must_use]
    pub fn as_patch(&self) -> CronJobPatch {
        CronJobPatch {
            name: Some(self.name.clone()),
            enabled: Some(self.enabled),
            delete_after_run: Some(self.delete_after_run),
            schedule: Some(self.schedule.clone()),
            session_target: Some(self.session_target.clone()),
            wake_mode: Some(self.wake_mode),
            payload: Some(self.payload.clone()),
            delivery: Some(self.delivery),
        }
    }
}

/// Partial update for `cron.update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CronJobPatch {
    /// New job name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New armed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// New delete-after-run flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_run: Option<bool>,
    /// New schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<CronSchedule>,
    /// New session target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_target: Option<String>,
    /// New wake behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake_mode: Option<WakeMode>,
    /// New payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// New delivery mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryMode>,
}

/// A job as listed by the cron daemon: external id plus its current spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// Daemon-assigned job id.
    pub id: String,
    /// Current job configuration.
    #[serde(flatten)]
    pub spec: CronJobSpec,
}

/// Completion status of one job firing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CronRunStatus {
    /// The firing completed successfully.
    Success,
    /// The firing errored inside the daemon.
    Error,
    /// The firing was skipped (daemon offline at the scheduled time).
    Skipped,
}

/// One recorded firing of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CronRunEntry {
    /// Firing time, epoch milliseconds.
    pub started_at_ms: i64,
    /// Completion status.
    pub status: CronRunStatus,
    /// Daemon-side error text for failed firings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Binding between an internal job key and the daemon's job id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerJobRef {
    /// Daemon-assigned job id backing this key.
    pub cron_job_id: String,
    /// First time this binding was established.
    pub created_at_ms: i64,
    /// Last time the backing job id changed.
    pub updated_at_ms: i64,
}
