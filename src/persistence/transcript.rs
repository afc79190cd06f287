//! Transcript file access: append-only JSONL, last-line inspection.

use std::io::Write;
use std::path::Path;

use crate::models::transcript::TranscriptMessage;
use crate::{AppError, Result};

/// Read the last message of a transcript file.
///
/// Returns `None` when the file is missing, empty, or its last non-empty
/// line is not a parseable message — all of which recovery treats as "do
/// not resume".
#[must_use]
pub fn read_last_message(path: &Path) -> Option<TranscriptMessage> {
    let raw = std::fs::read_to_string(path).ok()?;
    let last_line = raw.lines().rev().find(|line| !line.trim().is_empty())?;
    serde_json::from_str(last_line).ok()
}

/// Append one message to a transcript file, creating it (and its parent
/// directory) on first write.
///
/// # Errors
///
/// Returns `AppError::Store` on serialization failure and `AppError::Io` on
/// filesystem failure.
pub fn append_message(path: &Path, message: &TranscriptMessage) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut line = serde_json::to_string(message)
        .map_err(|err| AppError::Store(format!("failed to serialize transcript line: {err}")))?;
    line.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
