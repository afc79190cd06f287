//! Session-key → session binding store (`gateway/sessions.json`).
//!
//! Maps each stable session key to the underlying session id and transcript
//! file. Hard-stop and recovery consume it read-only; the dispatcher writes
//! a binding whenever a run is dispatched.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::now_ms;
use crate::{AppError, Result};

use super::{read_json_file, write_json_atomic};

/// One session binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    /// Underlying session id (distinct from the session key).
    pub session_id: String,
    /// Transcript file for the session.
    pub session_file: PathBuf,
    /// Last binding update, epoch milliseconds.
    pub updated_at_ms: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    #[serde(default)]
    sessions: HashMap<String, SessionEntry>,
}

/// The session binding store.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Create a store handle over the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the full binding map.
    ///
    /// A missing file is an empty map. A file that exists but cannot be
    /// parsed is an error — callers decide whether that propagates
    /// (hard-stop) or demotes to "unknown session" (recovery).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the file exists but is unreadable or
    /// invalid.
    pub fn load(&self) -> Result<HashMap<String, SessionEntry>> {
        match read_json_file(&self.path)? {
            None => Ok(HashMap::new()),
            Some(value) => {
                let file: SessionFile = serde_json::from_value(value).map_err(|err| {
                    AppError::Store(format!("invalid session store: {err}"))
                })?;
                Ok(file.sessions)
            }
        }
    }

    /// Look up one binding by session key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the store file is unreadable.
    pub fn lookup(&self, session_key: &str) -> Result<Option<SessionEntry>> {
        Ok(self.load()?.remove(session_key))
    }

    /// Insert or refresh a binding.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store`/`AppError::Io` when the rewrite fails.
    pub fn bind(&self, session_key: &str, session_id: &str, session_file: PathBuf) -> Result<()> {
        let mut sessions = self.load().unwrap_or_default();
        sessions.insert(
            session_key.to_owned(),
            SessionEntry {
                session_id: session_id.to_owned(),
                session_file,
                updated_at_ms: now_ms(),
            },
        );
        write_json_atomic(
            &self.path,
            &SessionFile {
                version: 1,
                sessions,
            },
        )
    }
}
