//! Persisted in-flight run records for crash recovery.

use serde::{Deserialize, Serialize};

/// Subsystem that started a run.
///
/// Recovery passes filter on this so independent subsystems (chat dispatch
/// vs. WhatsApp auto-reply) recover only their own runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    /// Interactive chat dispatch. Version-1 log entries carry no source
    /// field and default here.
    #[default]
    ChatSend,
    /// Unattended WhatsApp auto-reply dispatch.
    WhatsappAutoReply,
}

impl RunSource {
    /// Stable string form used in logs and filters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatSend => "chat_send",
            Self::WhatsappAutoReply => "whatsapp_auto_reply",
        }
    }
}

/// Durable record of a run that has started executing but not yet completed.
///
/// Lives in the versioned run log (`gateway/chat-runs.json`) from
/// `mark_run_in_flight` until the normal completion path clears it, recovery
/// expires it, or transcript inspection shows the run already finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRun {
    /// Unique run identifier (store key).
    pub run_id: String,
    /// Stable conversation identifier the run belongs to.
    pub session_key: String,
    /// Subsystem that started the run. Absent in version-1 files.
    #[serde(default)]
    pub source: RunSource,
    /// Optional owning account (e.g., WhatsApp account id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// First registration time. Age-based expiry measures from here, never
    /// from `updated_at_ms`, so retries do not extend the wall-clock lease.
    pub started_at_ms: i64,
    /// Last mutation time.
    pub updated_at_ms: i64,
    /// Times recovery has resumed this run.
    #[serde(default, skip_serializing_if = "recovery_attempts_unset")]
    pub recovery_attempts: u32,
    /// Last recovery resume time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_recovery_at_ms: Option<i64>,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde skip predicates take references
fn recovery_attempts_unset(attempts: &u32) -> bool {
    *attempts == 0
}

impl PersistedRun {
    /// Age of this run at `now_ms`, measured from first registration.
    #[must_use]
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.started_at_ms
    }
}
