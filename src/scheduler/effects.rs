//! Effect handlers for job firings, routed by job key.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::gateway::reply_queue::ReplyQueue;
use crate::persistence::planner_store::{PlannerState, PlannerStore};
use crate::{AppError, Result};

/// A parsed job key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Daily review agenda.
    DailyReview,
    /// Weekly review agenda.
    WeeklyReview,
    /// Monthly horizons review agenda.
    HorizonsReview,
    /// Calendar bridge sync.
    CalendarSync,
    /// Follow-up for one waiting item.
    Followup(String),
}

/// Parse an internal job key into its kind.
#[must_use]
pub fn parse_job_key(key: &str) -> Option<JobKind> {
    match key {
        "review:daily" => Some(JobKind::DailyReview),
        "review:weekly" => Some(JobKind::WeeklyReview),
        "review:horizons" => Some(JobKind::HorizonsReview),
        "calendar:sync" => Some(JobKind::CalendarSync),
        other => other
            .strip_prefix("followup:")
            .filter(|id| !id.is_empty())
            .map(|id| JobKind::Followup(id.to_owned())),
    }
}

/// Calendar bridge collaborator.
pub trait CalendarSync: Send + Sync {
    /// Run one sync, returning the number of events synchronized.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`](crate::AppError::Channel) if the bridge
    /// call fails.
    fn sync(&self) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>>;
}

/// Calendar bridge over a plain HTTP endpoint.
pub struct HttpCalendarSync {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpCalendarSync {
    /// Create a bridge client for the given endpoint.
    #[must_use]
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            http: reqwest::Client::new(),
        }
    }
}

impl CalendarSync for HttpCalendarSync {
    fn sync(&self) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .http
                .post(&self.endpoint)
                .send()
                .await
                .map_err(|err| AppError::Channel(format!("calendar sync failed: {err}")))?;
            if !response.status().is_success() {
                return Err(AppError::Channel(format!(
                    "calendar sync returned {}",
                    response.status()
                )));
            }
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            Ok(u32::try_from(body.get("events").and_then(serde_json::Value::as_u64).unwrap_or(0))
                .unwrap_or(u32::MAX))
        })
    }
}

/// Outbound follow-up delivery collaborator.
///
/// The production implementation enqueues into the gateway's reply lanes —
/// the channel send paths drain them from there.
pub trait FollowUpSender: Send + Sync {
    /// Deliver one follow-up message to a target.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`](crate::AppError::Channel) if delivery
    /// cannot be queued.
    fn send(&self, target: &str, text: &str)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Follow-up sender backed by the gateway reply lanes.
pub struct LaneSender {
    replies: Arc<ReplyQueue>,
}

impl LaneSender {
    /// Create a sender over the shared reply queue.
    #[must_use]
    pub fn new(replies: Arc<ReplyQueue>) -> Self {
        Self { replies }
    }
}

impl FollowUpSender for LaneSender {
    fn send(
        &self,
        target: &str,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let target = target.to_owned();
        let text = text.to_owned();
        Box::pin(async move {
            self.replies.enqueue(&target, text).await;
            Ok(())
        })
    }
}

/// Routes job firings to their side effects.
pub struct EffectRouter {
    config: SchedulerConfig,
    planner: Arc<PlannerStore>,
    replies: Arc<ReplyQueue>,
    calendar: Option<Arc<dyn CalendarSync>>,
    sender: Arc<dyn FollowUpSender>,
    allowlist: Vec<Regex>,
}

impl EffectRouter {
    /// Assemble a router; compiles the follow-up target allowlist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an allowlist pattern is invalid.
    pub fn new(
        config: SchedulerConfig,
        planner: Arc<PlannerStore>,
        replies: Arc<ReplyQueue>,
        calendar: Option<Arc<dyn CalendarSync>>,
        sender: Arc<dyn FollowUpSender>,
    ) -> Result<Self> {
        let allowlist = config
            .followup
            .allowlist
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    AppError::Config(format!("invalid allowlist pattern '{pattern}': {err}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            planner,
            replies,
            calendar,
            sender,
            allowlist,
        })
    }

    /// Handle one successful job firing.
    ///
    /// # Errors
    ///
    /// Returns the underlying effect failure; callers log it and advance
    /// the run marker regardless.
    pub async fn handle(&self, key: &str) -> Result<()> {
        match parse_job_key(key) {
            Some(JobKind::DailyReview) => self.run_review("daily").await,
            Some(JobKind::WeeklyReview) => self.run_review("weekly").await,
            Some(JobKind::HorizonsReview) => self.run_review("horizons").await,
            Some(JobKind::CalendarSync) => self.run_calendar_sync().await,
            Some(JobKind::Followup(item_id)) => self.run_followup(&item_id).await,
            None => {
                warn!(key, "firing for unrecognized job key ignored");
                Ok(())
            }
        }
    }

    async fn run_review(&self, period: &str) -> Result<()> {
        let planner = self.planner.load()?;
        let text = compose_review(period, &planner);
        self.replies.enqueue(&self.config.session_target, text).await;
        info!(period, "review agenda queued");
        Ok(())
    }

    async fn run_calendar_sync(&self) -> Result<()> {
        let Some(ref calendar) = self.calendar else {
            warn!("calendar sync fired but no bridge is configured");
            return Ok(());
        };

        match calendar.sync().await {
            Ok(events) => {
                info!(events, "calendar sync complete");
                Ok(())
            }
            Err(err) => {
                // Self-healing signal: surface the failure as an action item
                // the user/agent will actually see, not just a log line.
                if let Err(store_err) = self.planner.add_action_item(
                    &format!("Calendar sync is failing: {err}. Check the bridge endpoint."),
                    "calendar-sync",
                ) {
                    warn!(%store_err, "failed to record calendar-sync action item");
                }
                Err(err)
            }
        }
    }

    async fn run_followup(&self, item_id: &str) -> Result<()> {
        let Some(item) = self.planner.find_waiting(item_id)? else {
            // Resolved since the job fired; reconciliation garbage-collects
            // the job itself on the next tick.
            return Ok(());
        };

        let cadence_hours = item
            .cadence_hours
            .unwrap_or(self.config.followup.cadence_hours);

        let allowed_target = item
            .target
            .as_deref()
            .filter(|target| !target.trim().is_empty() && self.is_allowlisted(target));

        let Some(target) = allowed_target else {
            // No automatic send without an allowlisted target: draft for
            // manual confirmation and push the item out a full cadence so
            // the draft is not re-created every firing.
            self.planner.add_action_item(
                &format!(
                    "Draft follow-up for \"{}\" — confirm the target and send manually.",
                    item.title
                ),
                "followup",
            )?;
            self.planner
                .push_followup_out(item_id, cadence_hours.saturating_mul(60))?;
            info!(item_id, "follow-up drafted for manual confirmation");
            return Ok(());
        };

        let text = format!("Friendly follow-up: any update on \"{}\"?", item.title);
        match self.sender.send(target, &text).await {
            Ok(()) => {
                self.planner.advance_followup(item_id, cadence_hours)?;
                info!(item_id, target, "follow-up sent");
                Ok(())
            }
            Err(err) => {
                warn!(item_id, target, %err, "follow-up send failed; retrying on short backoff");
                self.planner
                    .push_followup_out(item_id, self.config.followup.retry_minutes)?;
                Err(err)
            }
        }
    }

    fn is_allowlisted(&self, target: &str) -> bool {
        self.allowlist.iter().any(|pattern| pattern.is_match(target))
    }
}

/// Compose the review agenda text for a period.
#[must_use]
pub fn compose_review(period: &str, planner: &PlannerState) -> String {
    let heading = match period {
        "daily" => "📋 Daily review",
        "weekly" => "🗓️ Weekly review",
        _ => "🔭 Horizons review",
    };

    let mut text = format!(
        "{heading} — {} waiting item(s), {} open action item(s).",
        planner.waiting.len(),
        planner.actions.len()
    );

    for item in &planner.waiting {
        text.push_str(&format!("\n• waiting: {}", item.title));
    }
    for action in &planner.actions {
        text.push_str(&format!("\n• action: {}", action.title));
    }

    text
}
