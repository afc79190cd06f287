//! Inbound message dispatch: stop commands, run launching, delegation.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::gateway::agent::run_agent_process;
use crate::gateway::reply_queue::ReplyQueue;
use crate::gateway::run_host::{EmbeddedRunHost, ProcessSupervisor};
use crate::models::hard_stop::{format_hard_stop_reply, HardStopResult};
use crate::models::run::{PersistedRun, RunSource};
use crate::models::transcript::TranscriptMessage;
use crate::orchestrator::hard_stop::{hard_stop_session_execution, HardStopDeps};
use crate::persistence::run_log::{MarkRunInFlight, RunLog};
use crate::persistence::session_store::SessionStore;
use crate::persistence::transcript;
use crate::registry::{ProcessRegistry, SubagentRegistry};
use crate::Result;

/// Shared handles every gateway component operates on.
pub struct GatewayDeps {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// OS process registry.
    pub processes: Arc<ProcessRegistry>,
    /// Sub-agent run registry.
    pub subagents: Arc<SubagentRegistry>,
    /// Embedded run tracking.
    pub run_host: Arc<EmbeddedRunHost>,
    /// Cooperative scope cancellation.
    pub supervisor: Arc<ProcessSupervisor>,
    /// Pending reply lanes.
    pub replies: Arc<ReplyQueue>,
    /// Durable in-flight run log.
    pub run_log: Arc<RunLog>,
    /// Session-key → session binding store.
    pub sessions: Arc<SessionStore>,
}

/// An inbound user message from any channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Stable conversation identifier.
    pub session_key: String,
    /// Message text.
    pub text: String,
    /// Subsystem the message arrived through.
    pub source: RunSource,
    /// Optional owning account (e.g., WhatsApp sender).
    pub account_id: Option<String>,
}

/// What handling an inbound message produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An immediate reply (command handling).
    Reply(String),
    /// A run was started; its reply lands in the session's lane later.
    RunStarted {
        /// Identifier of the started run.
        run_id: String,
    },
}

/// Point-in-time gateway counters for status tooling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusReport {
    /// Entries currently in the durable run log.
    pub runs_in_flight: usize,
    /// Live registered OS processes.
    pub live_processes: usize,
    /// Live embedded runs.
    pub embedded_runs: usize,
    /// Active sub-agent runs.
    pub active_subagents: usize,
    /// Queued outbound replies.
    pub pending_replies: usize,
}

/// Routes inbound messages to command handling or run dispatch.
pub struct Dispatcher {
    deps: Arc<GatewayDeps>,
}

impl Dispatcher {
    /// Create a dispatcher over shared gateway handles.
    #[must_use]
    pub fn new(deps: Arc<GatewayDeps>) -> Self {
        Self { deps }
    }

    /// Shared handles, for collaborators that need direct access.
    #[must_use]
    pub fn deps(&self) -> &Arc<GatewayDeps> {
        &self.deps
    }

    /// Handle one inbound message.
    ///
    /// `/stop` triggers the hard-stop cascade and answers immediately; any
    /// other text dispatches an agent run.
    ///
    /// # Errors
    ///
    /// Propagates session-store failures; run execution failures surface via
    /// the reply lane, not here.
    pub async fn handle_message(&self, message: InboundMessage) -> Result<DispatchOutcome> {
        let text = message.text.trim();
        if text == "/stop" || text.starts_with("/stop ") {
            let result = self.stop_session(&message.session_key).await?;
            return Ok(DispatchOutcome::Reply(format_hard_stop_reply(&result)));
        }
        self.dispatch_run(message).await
    }

    /// Hard-stop everything executing for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the session store cannot be read.
    pub async fn stop_session(&self, session_key: &str) -> Result<HardStopResult> {
        hard_stop_session_execution(
            &self.hard_stop_deps(),
            session_key,
            None,
            self.deps.config.gateway.escalation_ms,
        )
        .await
    }

    /// Dispatch an agent run for an inbound message.
    ///
    /// Marks the run in flight, binds the session, appends the user turn to
    /// the transcript, and launches the agent process in the background.
    /// The reply lands in the session's reply lane when the turn completes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the session binding or run log cannot
    /// be written.
    pub async fn dispatch_run(&self, message: InboundMessage) -> Result<DispatchOutcome> {
        let run_id = Uuid::new_v4().to_string();
        self.dispatch_run_with_id(run_id.clone(), message).await?;
        Ok(DispatchOutcome::RunStarted { run_id })
    }

    /// Delegate work to a sub-agent session on behalf of a requester.
    ///
    /// Registers the parent→child relationship so a hard-stop of the
    /// requester cascades into the child, then dispatches the child run
    /// under its own scope.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the session binding or run log cannot
    /// be written.
    pub async fn delegate_subagent(
        &self,
        requester_session_key: &str,
        child_session_key: &str,
        prompt: &str,
    ) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        self.deps
            .subagents
            .register(&run_id, child_session_key, requester_session_key)
            .await;
        self.dispatch_run_with_id(
            run_id.clone(),
            InboundMessage {
                session_key: child_session_key.to_owned(),
                text: prompt.to_owned(),
                source: RunSource::ChatSend,
                account_id: None,
            },
        )
        .await?;
        Ok(run_id)
    }

    /// Resume an interrupted run from its persisted record.
    ///
    /// Returns `Ok(false)` when the session binding no longer resolves —
    /// explicit non-resumption, the recovery loop keeps the entry for a
    /// later attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the transcript cannot be appended.
    pub async fn resume_run(&self, entry: &PersistedRun) -> Result<bool> {
        let Ok(Some(binding)) = self.deps.sessions.lookup(&entry.session_key) else {
            return Ok(false);
        };

        let prompt = transcript::read_last_message(&binding.session_file)
            .and_then(|message| match message {
                TranscriptMessage::User { content } => content.as_str().map(str::to_owned),
                _ => None,
            })
            .unwrap_or_else(|| "Continue where you left off.".to_owned());

        info!(
            run_id = %entry.run_id,
            session_key = %entry.session_key,
            source = entry.source.as_str(),
            "resuming interrupted run"
        );

        self.spawn_run(
            entry.run_id.clone(),
            entry.session_key.clone(),
            binding.session_id,
            binding.session_file,
            prompt,
        )
        .await;
        Ok(true)
    }

    /// Current gateway counters.
    pub async fn status(&self) -> StatusReport {
        StatusReport {
            runs_in_flight: self.deps.run_log.load().len(),
            live_processes: self.deps.processes.live_count().await,
            embedded_runs: self.deps.run_host.active_runs().await,
            active_subagents: self.deps.subagents.active_count().await,
            pending_replies: self.deps.replies.pending_total().await,
        }
    }

    fn hard_stop_deps(&self) -> HardStopDeps {
        HardStopDeps {
            processes: Arc::clone(&self.deps.processes),
            subagents: Arc::clone(&self.deps.subagents),
            run_host: Arc::clone(&self.deps.run_host),
            supervisor: Arc::clone(&self.deps.supervisor),
            replies: Arc::clone(&self.deps.replies),
            sessions: Arc::clone(&self.deps.sessions),
        }
    }

    async fn dispatch_run_with_id(&self, run_id: String, message: InboundMessage) -> Result<()> {
        let (session_id, session_file) = match self.deps.sessions.lookup(&message.session_key)? {
            Some(entry) => (entry.session_id, entry.session_file),
            None => {
                let session_id = Uuid::new_v4().to_string();
                let session_file = self
                    .deps
                    .config
                    .transcripts_dir()
                    .join(format!("{session_id}.jsonl"));
                (session_id, session_file)
            }
        };

        self.deps
            .sessions
            .bind(&message.session_key, &session_id, session_file.clone())?;

        self.deps.run_log.mark_run_in_flight(&MarkRunInFlight {
            run_id: run_id.clone(),
            session_key: message.session_key.clone(),
            source: message.source,
            account_id: message.account_id.clone(),
        })?;

        transcript::append_message(&session_file, &TranscriptMessage::user_text(&message.text))?;

        info!(
            run_id,
            session_key = %message.session_key,
            source = message.source.as_str(),
            "run dispatched"
        );

        self.spawn_run(
            run_id,
            message.session_key,
            session_id,
            session_file,
            message.text,
        )
        .await;
        Ok(())
    }

    /// Launch the agent process for a run and finalize its bookkeeping when
    /// the turn ends.
    async fn spawn_run(
        &self,
        run_id: String,
        session_key: String,
        session_id: String,
        session_file: PathBuf,
        prompt: String,
    ) {
        let deps = Arc::clone(&self.deps);
        let scope_token = deps.supervisor.scope_token(&session_key).await;
        let run_token = deps.run_host.begin_run(&session_id, &scope_token).await;

        let span = info_span!("agent_run", run_id = %run_id, session_key = %session_key);
        tokio::spawn(
            async move {
                let outcome = run_agent_process(
                    &deps.config.gateway,
                    &deps.processes,
                    &session_key,
                    &session_key,
                    &prompt,
                    run_token.clone(),
                )
                .await;

                let closing = match outcome {
                    Ok(reply) => {
                        deps.replies.enqueue(&session_key, reply.clone()).await;
                        TranscriptMessage::assistant_text(reply, "end_turn")
                    }
                    Err(err) if run_token.is_cancelled() => {
                        info!(%err, "run aborted");
                        TranscriptMessage::assistant_text("", "aborted")
                    }
                    Err(err) => {
                        warn!(%err, "run failed");
                        TranscriptMessage::assistant_text(err.to_string(), "error")
                    }
                };

                if let Err(err) = transcript::append_message(&session_file, &closing) {
                    warn!(%err, "failed to append closing transcript turn");
                }

                deps.run_host.finish_run(&session_id).await;
                deps.subagents.mark_terminated(&run_id, "exited").await;

                // Normal completion path: the in-flight record must go, or
                // the next restart would replay a finished run.
                if let Err(err) = deps.run_log.clear_run_in_flight(&run_id) {
                    warn!(%err, "failed to clear in-flight run record");
                }
            }
            .instrument(span),
        );
    }
}
