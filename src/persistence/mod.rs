//! Durable JSON stores under the state directory.
//!
//! Every store here is a whole-file read-modify-write over a single JSON
//! document, owned by exactly one process. Writes go through an atomic
//! temp-file-and-rename so a crash mid-write never leaves a torn file.

pub mod planner_store;
pub mod run_log;
pub mod scheduler_state;
pub mod session_store;
pub mod transcript;

use std::path::Path;

use serde::Serialize;

use crate::{AppError, Result};

/// Serialize a value as pretty JSON and atomically replace `path` with it.
///
/// The temp file is created in the target's parent directory so the final
/// rename stays on one filesystem.
///
/// # Errors
///
/// Returns `AppError::Store` on serialization failure and `AppError::Io` on
/// filesystem failure.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("store path has no parent: {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let json = serde_json::to_vec_pretty(value)
        .map_err(|err| AppError::Store(format!("failed to serialize store: {err}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, &json)?;
    tmp.persist(path)
        .map_err(|err| AppError::Io(format!("failed to persist store file: {err}")))?;
    Ok(())
}

/// Read a JSON document from `path`.
///
/// Returns `Ok(None)` when the file does not exist — expected absence, not
/// an error.
///
/// # Errors
///
/// Returns `AppError::Store` when the file exists but cannot be read or
/// parsed.
pub fn read_json_file(path: &Path) -> Result<Option<serde_json::Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(AppError::Store(format!(
                "cannot read {}: {err}",
                path.display()
            )))
        }
    };
    let value = serde_json::from_str(&raw)
        .map_err(|err| AppError::Store(format!("cannot parse {}: {err}", path.display())))?;
    Ok(Some(value))
}
