//! Inbound HTTP surface: webchat messages, session stop, health, and the
//! WhatsApp webhook.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::gateway::dispatcher::{DispatchOutcome, Dispatcher, InboundMessage};
use crate::models::hard_stop::format_hard_stop_reply;
use crate::models::run::RunSource;
use crate::{AppError, Result};

/// Shared state for all HTTP handlers.
pub struct HttpState {
    /// Message dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Server start time, for health reporting.
    pub started_at: Instant,
}

/// Build the gateway router.
#[must_use]
pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/api/messages", post(post_message))
        .route("/api/sessions/{session_key}/stop", post(stop_session))
        .route("/healthz", get(healthz))
        .route("/webhooks/whatsapp", get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

/// Bind and serve the gateway until the cancellation token fires.
///
/// # Errors
///
/// Returns `AppError::Http` if the listener cannot bind or the server
/// fails.
pub async fn serve_http(state: Arc<HttpState>, cancel: CancellationToken) -> Result<()> {
    let port = state.config.gateway.http_port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|err| AppError::Http(format!("cannot bind port {port}: {err}")))?;

    info!(port, "gateway http listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|err| AppError::Http(format!("http server failed: {err}")))
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    session_key: String,
    text: String,
    #[serde(default)]
    account_id: Option<String>,
}

/// `POST /api/messages` — webchat inbound.
async fn post_message(
    State(state): State<Arc<HttpState>>,
    Json(request): Json<MessageRequest>,
) -> impl IntoResponse {
    let message = InboundMessage {
        session_key: request.session_key,
        text: request.text,
        source: RunSource::ChatSend,
        account_id: request.account_id,
    };

    match state.dispatcher.handle_message(message).await {
        Ok(DispatchOutcome::Reply(reply)) => {
            (StatusCode::OK, Json(json!({ "reply": reply }))).into_response()
        }
        Ok(DispatchOutcome::RunStarted { run_id }) => {
            (StatusCode::ACCEPTED, Json(json!({ "run_id": run_id }))).into_response()
        }
        Err(err) => {
            warn!(%err, "message dispatch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// `POST /api/sessions/{session_key}/stop` — operator hard-stop.
async fn stop_session(
    State(state): State<Arc<HttpState>>,
    Path(session_key): Path<String>,
) -> impl IntoResponse {
    match state.dispatcher.stop_session(&session_key).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "reply": format_hard_stop_reply(&result),
                "result": result,
            })),
        )
            .into_response(),
        Err(err) => {
            warn!(%err, session_key, "hard stop failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET /healthz` — liveness and gateway counters.
async fn healthz(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let status = state.dispatcher.status().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "gateway": status,
        })),
    )
}

/// `GET /webhooks/whatsapp` — Meta's verification handshake.
async fn verify_webhook(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if state.config.whatsapp.enabled
        && mode == Some("subscribe")
        && token == Some(state.config.whatsapp.verify_token.as_str())
    {
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!("webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
struct WebhookChange {
    #[serde(default)]
    value: WebhookValue,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookValue {
    #[serde(default)]
    messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    from: String,
    #[serde(default)]
    text: Option<WebhookText>,
}

#[derive(Debug, Deserialize)]
struct WebhookText {
    body: String,
}

/// `POST /webhooks/whatsapp` — signed inbound messages.
async fn receive_webhook(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !state.config.whatsapp.enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !signature_valid(&state.config.whatsapp.app_secret, signature, &body) {
        warn!("webhook signature rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(%err, "webhook payload invalid");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    for entry in payload.entry {
        for change in entry.changes {
            for message in change.value.messages {
                let Some(text) = message.text else { continue };
                let inbound = InboundMessage {
                    session_key: format!("wa:{}", message.from),
                    text: text.body,
                    source: RunSource::WhatsappAutoReply,
                    account_id: Some(message.from.clone()),
                };
                if let Err(err) = state.dispatcher.handle_message(inbound).await {
                    warn!(%err, from = %message.from, "webhook dispatch failed");
                }
            }
        }
    }

    StatusCode::OK.into_response()
}

/// Verify an `X-Hub-Signature-256` header against the raw body.
///
/// Comparison is constant-time over the decoded MAC bytes.
#[must_use]
pub fn signature_valid(app_secret: &str, header: &str, body: &[u8]) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.as_slice().ct_eq(provided.as_slice()).into()
}
