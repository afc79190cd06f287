//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name under which secrets are stored.
const KEYRING_SERVICE: &str = "agent-switchboard";

/// Gateway server settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    /// HTTP port for the inbound message surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Named pipe / Unix socket identifier for the ctl companion.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Host CLI binary that executes agent runs (e.g., `claude`).
    pub host_cli: String,
    /// Default arguments for the host CLI.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Delay between graceful and forceful termination during hard-stop.
    #[serde(default = "default_escalation_ms")]
    pub escalation_ms: u64,
}

fn default_http_port() -> u16 {
    8180
}

fn default_ipc_name() -> String {
    "agent-switchboard".into()
}

fn default_escalation_ms() -> u64 {
    150
}

/// WhatsApp webhook settings.
///
/// The app secret used for `X-Hub-Signature-256` verification is loaded at
/// runtime via OS keychain or environment variable, never from TOML.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WhatsappConfig {
    /// Whether the webhook endpoints are served.
    #[serde(default)]
    pub enabled: bool,
    /// Token echoed during Meta's webhook verification handshake.
    #[serde(default)]
    pub verify_token: String,
    /// HMAC app secret (populated at runtime).
    #[serde(skip)]
    pub app_secret: String,
}

/// Daily review firing time.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DailyReviewConfig {
    /// Hour of day, 0–23.
    #[serde(default = "default_review_hour")]
    pub hour: u8,
    /// Minute, 0–59.
    #[serde(default = "default_review_minute")]
    pub minute: u8,
}

impl Default for DailyReviewConfig {
    fn default() -> Self {
        Self {
            hour: default_review_hour(),
            minute: default_review_minute(),
        }
    }
}

/// Weekly review firing time.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WeeklyReviewConfig {
    /// Day of week, 0 = Sunday … 6 = Saturday.
    #[serde(default)]
    pub weekday: u8,
    /// Hour of day, 0–23.
    #[serde(default = "default_review_hour")]
    pub hour: u8,
    /// Minute, 0–59.
    #[serde(default = "default_review_minute")]
    pub minute: u8,
}

impl Default for WeeklyReviewConfig {
    fn default() -> Self {
        Self {
            weekday: 0,
            hour: default_review_hour(),
            minute: default_review_minute(),
        }
    }
}

/// Monthly horizons review firing time.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HorizonsReviewConfig {
    /// Day of month, 1–28.
    #[serde(default = "default_horizons_day")]
    pub day_of_month: u8,
    /// Hour of day, 0–23.
    #[serde(default = "default_review_hour")]
    pub hour: u8,
    /// Minute, 0–59.
    #[serde(default = "default_review_minute")]
    pub minute: u8,
}

impl Default for HorizonsReviewConfig {
    fn default() -> Self {
        Self {
            day_of_month: default_horizons_day(),
            hour: default_review_hour(),
            minute: default_review_minute(),
        }
    }
}

fn default_review_hour() -> u8 {
    18
}

fn default_review_minute() -> u8 {
    30
}

fn default_horizons_day() -> u8 {
    1
}

/// Calendar sync job settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CalendarSyncConfig {
    /// Whether the periodic sync job is desired.
    #[serde(default)]
    pub enabled: bool,
    /// Interval between syncs.
    #[serde(default = "default_calendar_minutes")]
    pub every_minutes: u32,
    /// Calendar bridge endpoint invoked on each firing.
    #[serde(default)]
    pub endpoint: String,
}

fn default_calendar_minutes() -> u32 {
    30
}

/// Waiting-item follow-up settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FollowupConfig {
    /// Interval between follow-ups for one waiting item.
    #[serde(default = "default_cadence_hours")]
    pub cadence_hours: u32,
    /// Backoff after a failed delivery, deliberately much shorter than the
    /// full cadence.
    #[serde(default = "default_retry_minutes")]
    pub retry_minutes: u32,
    /// Anchored regex patterns for targets that may be messaged without
    /// manual confirmation. A target matching no pattern gets a draft
    /// instead of an automatic send.
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            cadence_hours: default_cadence_hours(),
            retry_minutes: default_retry_minutes(),
            allowlist: Vec::new(),
        }
    }
}

fn default_cadence_hours() -> u32 {
    72
}

fn default_retry_minutes() -> u32 {
    30
}

/// Scheduler reconciler settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Whether the reconciler runs at all.
    #[serde(default)]
    pub enabled: bool,
    /// Agent name used in job-name namespacing and state-file naming.
    #[serde(default = "default_agent")]
    pub agent: String,
    /// Job-name namespace prefix component.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Session firings are delivered to.
    #[serde(default = "default_session_target")]
    pub session_target: String,
    /// Seconds between reconciliation ticks.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// Daily review firing time.
    #[serde(default)]
    pub daily_review: DailyReviewConfig,
    /// Weekly review firing time.
    #[serde(default)]
    pub weekly_review: WeeklyReviewConfig,
    /// Monthly horizons review firing time.
    #[serde(default)]
    pub horizons_review: HorizonsReviewConfig,
    /// Calendar sync job settings.
    #[serde(default)]
    pub calendar_sync: CalendarSyncConfig,
    /// Waiting-item follow-up settings.
    #[serde(default)]
    pub followup: FollowupConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            agent: default_agent(),
            namespace: default_namespace(),
            session_target: default_session_target(),
            tick_seconds: default_tick_seconds(),
            daily_review: DailyReviewConfig::default(),
            weekly_review: WeeklyReviewConfig::default(),
            horizons_review: HorizonsReviewConfig::default(),
            calendar_sync: CalendarSyncConfig::default(),
            followup: FollowupConfig::default(),
        }
    }
}

fn default_agent() -> String {
    "main".into()
}

fn default_namespace() -> String {
    "sched".into()
}

fn default_session_target() -> String {
    "main".into()
}

fn default_tick_seconds() -> u64 {
    60
}

/// External cron daemon connection settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CronConfig {
    /// Base URL of the cron daemon's RPC surface. Empty disables the
    /// scheduler even when `[scheduler].enabled` is set.
    #[serde(default)]
    pub base_url: String,
    /// Bearer token (populated at runtime).
    #[serde(skip)]
    pub token: Option<String>,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// State directory holding all durable JSON stores.
    pub state_dir: PathBuf,
    /// Gateway server settings.
    pub gateway: GatewayConfig,
    /// WhatsApp webhook settings.
    #[serde(default)]
    pub whatsapp: WhatsappConfig,
    /// Scheduler reconciler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// External cron daemon settings.
    #[serde(default)]
    pub cron: CronConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load secrets from OS keychain with env-var fallback.
    ///
    /// The cron bearer token (`cron_token` / `CRON_SERVICE_TOKEN`) is
    /// optional; the WhatsApp app secret (`whatsapp_app_secret` /
    /// `WHATSAPP_APP_SECRET`) is required when the webhook is enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required secret cannot be found.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if !self.cron.base_url.is_empty() {
            match load_credential("cron_token", "CRON_SERVICE_TOKEN").await {
                Ok(token) => self.cron.token = Some(token),
                Err(_) => {
                    warn!("no cron service token configured; calling the daemon unauthenticated");
                }
            }
        }

        if self.whatsapp.enabled {
            self.whatsapp.app_secret =
                load_credential("whatsapp_app_secret", "WHATSAPP_APP_SECRET").await?;
        }

        Ok(())
    }

    /// Path of the durable run recovery log.
    #[must_use]
    pub fn runs_file(&self) -> PathBuf {
        self.state_dir.join("gateway").join("chat-runs.json")
    }

    /// Path of the session-key → session binding store.
    #[must_use]
    pub fn sessions_file(&self) -> PathBuf {
        self.state_dir.join("gateway").join("sessions.json")
    }

    /// Path of the planner (waiting/action item) store.
    #[must_use]
    pub fn planner_file(&self) -> PathBuf {
        self.state_dir.join("gateway").join("planner.json")
    }

    /// Path of the scheduler reconciler's state file for this agent.
    #[must_use]
    pub fn scheduler_state_file(&self) -> PathBuf {
        self.state_dir
            .join("gateway")
            .join(format!("scheduler-{}.json", self.scheduler.agent))
    }

    /// Directory holding session transcript files.
    #[must_use]
    pub fn transcripts_dir(&self) -> PathBuf {
        self.state_dir.join("gateway").join("transcripts")
    }

    fn validate(&mut self) -> Result<()> {
        if self.gateway.host_cli.trim().is_empty() {
            return Err(AppError::Config("gateway.host_cli must not be empty".into()));
        }

        if self.gateway.escalation_ms == 0 {
            return Err(AppError::Config(
                "gateway.escalation_ms must be greater than zero".into(),
            ));
        }

        if self.scheduler.tick_seconds == 0 {
            return Err(AppError::Config(
                "scheduler.tick_seconds must be greater than zero".into(),
            ));
        }

        if self.whatsapp.enabled && self.whatsapp.verify_token.trim().is_empty() {
            return Err(AppError::Config(
                "whatsapp.verify_token must be set when the webhook is enabled".into(),
            ));
        }

        for pattern in &self.scheduler.followup.allowlist {
            regex::Regex::new(pattern).map_err(|err| {
                AppError::Config(format!("invalid followup allowlist pattern '{pattern}': {err}"))
            })?;
        }

        fs::create_dir_all(&self.state_dir)
            .map_err(|err| AppError::Config(format!("cannot create state_dir: {err}")))?;
        let canonical = self
            .state_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("state_dir invalid: {err}")))?;
        self.state_dir = canonical;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
