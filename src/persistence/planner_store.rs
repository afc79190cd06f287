//! Planner state: waiting items awaiting follow-up and action items
//! (`gateway/planner.json`).
//!
//! This is the mutable state the scheduler derives its dynamic one-shot
//! jobs from: one follow-up job per active waiting item, scheduled at the
//! item's follow-up time. Effects mutate follow-up times and append action
//! items (drafts, recovery notes).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::now_ms;
use crate::{AppError, Result};

use super::{read_json_file, write_json_atomic};

/// Something we are waiting on a third party for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitingItem {
    /// Unique item id.
    pub id: String,
    /// What is being waited on.
    pub title: String,
    /// Delivery target for automated follow-ups (phone number, chat id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Next follow-up time, epoch milliseconds.
    pub follow_up_at_ms: i64,
    /// Per-item cadence override, hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence_hours: Option<u32>,
    /// Creation time, epoch milliseconds.
    pub created_at_ms: i64,
}

/// A note requiring user or agent attention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    /// Unique item id.
    pub id: String,
    /// What needs doing.
    pub title: String,
    /// Subsystem that raised the item (`"calendar-sync"`, `"followup"`, …).
    pub origin: String,
    /// Creation time, epoch milliseconds.
    pub created_at_ms: i64,
}

/// Full planner state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlannerState {
    /// Active waiting items.
    #[serde(default)]
    pub waiting: Vec<WaitingItem>,
    /// Open action items.
    #[serde(default)]
    pub actions: Vec<ActionItem>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlannerFile {
    version: u32,
    #[serde(flatten)]
    state: PlannerState,
}

/// The planner store.
pub struct PlannerStore {
    path: PathBuf,
}

impl PlannerStore {
    /// Create a store handle over the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the planner state; a missing file is empty state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the file exists but is invalid —
    /// planner contents are user data, silently discarding them is worse
    /// than failing the tick.
    pub fn load(&self) -> Result<PlannerState> {
        match read_json_file(&self.path)? {
            None => Ok(PlannerState::default()),
            Some(value) => {
                let file: PlannerFile = serde_json::from_value(value)
                    .map_err(|err| AppError::Store(format!("invalid planner store: {err}")))?;
                Ok(file.state)
            }
        }
    }

    /// Rewrite the planner state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` when the rewrite fails.
    pub fn save(&self, state: &PlannerState) -> Result<()> {
        write_json_atomic(
            &self.path,
            &PlannerFile {
                version: 1,
                state: state.clone(),
            },
        )
    }

    /// Add a waiting item.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` on load or rewrite failure.
    pub fn add_waiting(&self, item: WaitingItem) -> Result<()> {
        let mut state = self.load()?;
        state.waiting.retain(|existing| existing.id != item.id);
        state.waiting.push(item);
        self.save(&state)
    }

    /// Remove a waiting item (the wait was resolved).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` on load or rewrite failure.
    pub fn resolve_waiting(&self, item_id: &str) -> Result<bool> {
        let mut state = self.load()?;
        let before = state.waiting.len();
        state.waiting.retain(|item| item.id != item_id);
        let removed = state.waiting.len() != before;
        if removed {
            self.save(&state)?;
        }
        Ok(removed)
    }

    /// Find one waiting item by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the store is unreadable.
    pub fn find_waiting(&self, item_id: &str) -> Result<Option<WaitingItem>> {
        Ok(self.load()?.waiting.into_iter().find(|item| item.id == item_id))
    }

    /// Move an item's follow-up time to `now + minutes`.
    ///
    /// Used both for the short retry backoff after a failed send and for
    /// pushing out drafts awaiting manual confirmation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` on load or rewrite failure.
    pub fn push_followup_out(&self, item_id: &str, minutes: u32) -> Result<()> {
        self.set_followup_at(item_id, now_ms() + i64::from(minutes) * 60_000)
    }

    /// Advance an item's follow-up time to `now + hours` after a successful
    /// send.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` on load or rewrite failure.
    pub fn advance_followup(&self, item_id: &str, hours: u32) -> Result<()> {
        self.set_followup_at(item_id, now_ms() + i64::from(hours) * 3_600_000)
    }

    fn set_followup_at(&self, item_id: &str, at_ms: i64) -> Result<()> {
        let mut state = self.load()?;
        let mut changed = false;
        for item in &mut state.waiting {
            if item.id == item_id {
                item.follow_up_at_ms = at_ms;
                changed = true;
            }
        }
        if changed {
            self.save(&state)?;
        }
        Ok(())
    }

    /// Append an action item.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` on load or rewrite failure.
    pub fn add_action_item(&self, title: &str, origin: &str) -> Result<ActionItem> {
        let mut state = self.load()?;
        let item = ActionItem {
            id: Uuid::new_v4().to_string(),
            title: title.to_owned(),
            origin: origin.to_owned(),
            created_at_ms: now_ms(),
        };
        state.actions.push(item.clone());
        self.save(&state)?;
        Ok(item)
    }
}
