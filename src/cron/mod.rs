//! External cron service abstraction.
//!
//! The [`CronService`] trait decouples the scheduler reconciler from the
//! concrete cron daemon transport. The production implementation is the
//! HTTP client in [`client`]; tests substitute an in-memory fake.

pub mod client;

use std::future::Future;
use std::pin::Pin;

use crate::models::cron::{CronJob, CronJobPatch, CronJobSpec, CronRunEntry};
use crate::Result;

pub use client::HttpCronService;

/// Outcome of removing a job.
///
/// Stale-job garbage collection routinely races the daemon's own
/// `delete_after_run` cleanup; an already-missing job is an expected
/// outcome there, and modeling it explicitly keeps genuine RPC failures
/// visible instead of blanket-swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The job existed and was removed.
    Removed,
    /// The job was already gone.
    NotFound,
}

/// RPC surface of the external cron daemon.
pub trait CronService: Send + Sync {
    /// Create a job, returning the daemon-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cron`](crate::AppError::Cron) if the RPC fails.
    fn add(&self, spec: CronJobSpec) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Patch an existing job.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cron`](crate::AppError::Cron) if the RPC fails.
    fn update(
        &self,
        id: &str,
        patch: CronJobPatch,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove a job.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cron`](crate::AppError::Cron) if the RPC fails
    /// for a reason other than the job already being gone.
    fn remove(&self, id: &str) -> Pin<Box<dyn Future<Output = Result<RemoveOutcome>> + Send + '_>>;

    /// List jobs, optionally including disabled ones.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cron`](crate::AppError::Cron) if the RPC fails.
    fn list(
        &self,
        include_disabled: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CronJob>>> + Send + '_>>;

    /// Fetch the most recent run records for a job, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cron`](crate::AppError::Cron) if the RPC fails.
    fn runs(
        &self,
        id: &str,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CronRunEntry>>> + Send + '_>>;
}
