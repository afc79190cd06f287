//! Pending reply lanes keyed by session key or session id.
//!
//! Outbound channel workers drain lanes; hard-stop clears them wholesale so
//! an aborted session does not keep talking. Entries may be enqueued under
//! either the session key or the session id, so clearing takes both as
//! candidate keys.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::hard_stop::ClearedQueues;
use crate::models::now_ms;

/// One queued outbound reply.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueuedReply {
    /// Lane the reply is queued under.
    pub lane: String,
    /// Reply text.
    pub text: String,
    /// Enqueue time, epoch milliseconds.
    pub queued_at_ms: i64,
}

/// In-memory reply lanes.
#[derive(Default)]
pub struct ReplyQueue {
    lanes: Mutex<HashMap<String, VecDeque<QueuedReply>>>,
}

impl ReplyQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply to a lane.
    pub async fn enqueue(&self, lane: &str, text: impl Into<String>) {
        let mut lanes = self.lanes.lock().await;
        lanes.entry(lane.to_owned()).or_default().push_back(QueuedReply {
            lane: lane.to_owned(),
            text: text.into(),
            queued_at_ms: now_ms(),
        });
    }

    /// Remove and return everything queued in a lane.
    pub async fn drain(&self, lane: &str) -> Vec<QueuedReply> {
        let mut lanes = self.lanes.lock().await;
        lanes
            .remove(lane)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drop all entries queued under any of the candidate keys.
    ///
    /// Duplicate keys are counted once.
    pub async fn clear_session_queues(&self, keys: &[&str]) -> ClearedQueues {
        let distinct: HashSet<&str> = keys.iter().copied().filter(|k| !k.is_empty()).collect();
        let mut cleared = ClearedQueues::default();

        let mut lanes = self.lanes.lock().await;
        for key in distinct {
            if let Some(entries) = lanes.remove(key) {
                cleared.lanes += 1;
                cleared.entries += entries.len();
            }
        }

        if cleared.entries > 0 {
            debug!(lanes = cleared.lanes, entries = cleared.entries, "reply lanes cleared");
        }
        cleared
    }

    /// Total queued entries across all lanes.
    pub async fn pending_total(&self) -> usize {
        let lanes = self.lanes.lock().await;
        lanes.values().map(VecDeque::len).sum()
    }
}
