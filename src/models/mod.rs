//! Domain models shared across the gateway, orchestrator, and scheduler.

pub mod cron;
pub mod hard_stop;
pub mod process;
pub mod run;
pub mod subagent;
pub mod transcript;

/// Current wall-clock time as epoch milliseconds.
///
/// Durable records store integer millisecond timestamps so store files stay
/// comparable across processes regardless of local timezone settings.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
