//! Transcript message model and the terminal-turn decision.
//!
//! Session transcripts are line-delimited JSON, one message per line, tagged
//! by `role`. Recovery inspects only the last line to decide whether an
//! interrupted run still owes the user a reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One transcript line, discriminated by the `role` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role")]
pub enum TranscriptMessage {
    /// A user-authored message.
    #[serde(rename = "user")]
    User {
        /// Message body (string or structured blocks).
        #[serde(default)]
        content: Value,
    },
    /// An assistant turn, possibly mid-tool-call.
    #[serde(rename = "assistant")]
    Assistant {
        /// Message body (string or structured blocks).
        #[serde(default)]
        content: Value,
        /// Provider stop reason for the turn, when recorded.
        #[serde(
            default,
            rename = "stopReason",
            alias = "stop_reason",
            skip_serializing_if = "Option::is_none"
        )]
        stop_reason: Option<String>,
    },
    /// A tool execution result fed back to the agent.
    #[serde(rename = "toolResult", alias = "tool_result")]
    ToolResult {
        /// Tool output body.
        #[serde(default)]
        content: Value,
    },
}

impl TranscriptMessage {
    /// Build a plain-text user message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User {
            content: Value::String(text.into()),
        }
    }

    /// Build a plain-text assistant message with a stop reason.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>, stop_reason: impl Into<String>) -> Self {
        Self::Assistant {
            content: Value::String(text.into()),
            stop_reason: Some(stop_reason.into()),
        }
    }

    /// Whether an interrupted run ending on this message should be resumed.
    ///
    /// A trailing `user` or `toolResult` message means the agent owed a
    /// reply. A trailing assistant message warrants resumption only when the
    /// turn did not complete — see [`assistant_turn_is_terminal`].
    #[must_use]
    pub fn warrants_resume(&self) -> bool {
        match self {
            Self::User { .. } | Self::ToolResult { .. } => true,
            Self::Assistant {
                content,
                stop_reason,
            } => !assistant_turn_is_terminal(stop_reason.as_deref(), content),
        }
    }
}

/// Stop reasons that mark an assistant turn as finished (or failed), in
/// either provider spelling.
const TERMINAL_STOP_REASONS: &[&str] = &["stop", "end_turn", "endturn", "error", "aborted"];

/// Stop reasons that mark an assistant turn as paused mid-tool-call.
const TOOL_CALL_STOP_REASONS: &[&str] = &["tool_use", "tool_calls"];

/// Decide whether an assistant message is a completed terminal turn.
///
/// An explicit terminal stop reason wins; an explicit tool-call stop reason
/// marks the turn non-terminal. With no recognizable stop reason, the content
/// is scanned for tool-use/tool-call/function-call blocks — their presence
/// means the agent was interrupted mid-tool-call.
#[must_use]
pub fn assistant_turn_is_terminal(stop_reason: Option<&str>, content: &Value) -> bool {
    if let Some(reason) = stop_reason {
        let reason = reason.trim().to_ascii_lowercase();
        if TERMINAL_STOP_REASONS.contains(&reason.as_str()) {
            return true;
        }
        if TOOL_CALL_STOP_REASONS.contains(&reason.as_str()) {
            return false;
        }
    }
    !content_has_tool_call(content)
}

/// Scan message content for any tool-use/tool-call/function-call block.
fn content_has_tool_call(content: &Value) -> bool {
    match content {
        Value::Array(blocks) => blocks.iter().any(content_has_tool_call),
        Value::Object(map) => {
            if let Some(kind) = map.get("type").and_then(Value::as_str) {
                if matches!(kind, "tool_use" | "tool_call" | "function_call") {
                    return true;
                }
            }
            map.contains_key("tool_calls") || map.contains_key("function_call")
        }
        _ => false,
    }
}
