//! Unit tests for the durable run log: registration semantics, version
//! upgrade, and corruption tolerance.

use agent_switchboard::models::run::RunSource;
use agent_switchboard::persistence::run_log::{MarkRunInFlight, RunLog};

fn log_in(dir: &tempfile::TempDir) -> RunLog {
    RunLog::new(dir.path().join("gateway").join("chat-runs.json"))
}

fn mark(run_id: &str, session_key: &str, source: RunSource) -> MarkRunInFlight {
    MarkRunInFlight {
        run_id: run_id.into(),
        session_key: session_key.into(),
        source,
        account_id: None,
    }
}

#[test]
fn missing_file_is_an_empty_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(log_in(&dir).load().is_empty());
}

#[test]
fn mark_then_load_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = log_in(&dir);

    log.mark_run_in_flight(&mark("r1", "main", RunSource::ChatSend))
        .expect("mark");

    let runs = log.load();
    assert_eq!(runs.len(), 1);
    let entry = &runs["r1"];
    assert_eq!(entry.session_key, "main");
    assert_eq!(entry.source, RunSource::ChatSend);
    assert_eq!(entry.recovery_attempts, 0);
    assert!(entry.started_at_ms > 0);
}

#[test]
fn blank_identifiers_are_a_silent_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = log_in(&dir);

    log.mark_run_in_flight(&mark("  ", "main", RunSource::ChatSend))
        .expect("no-op");
    log.mark_run_in_flight(&mark("r1", "   ", RunSource::ChatSend))
        .expect("no-op");

    assert!(log.load().is_empty());
}

#[test]
fn re_registration_preserves_recovery_bookkeeping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = log_in(&dir);

    log.mark_run_in_flight(&mark("r1", "main", RunSource::ChatSend))
        .expect("mark");

    // Simulate a recovery pass having bumped the entry.
    let mut runs = log.load();
    let entry = runs.get_mut("r1").expect("entry");
    entry.started_at_ms = 1_000;
    entry.recovery_attempts = 2;
    entry.last_recovery_at_ms = Some(2_000);
    log.save(&runs).expect("save");

    // Re-arm: the three recovery fields survive, updated_at advances.
    log.mark_run_in_flight(&mark("r1", "main", RunSource::ChatSend))
        .expect("re-arm");

    let runs = log.load();
    let entry = &runs["r1"];
    assert_eq!(entry.started_at_ms, 1_000);
    assert_eq!(entry.recovery_attempts, 2);
    assert_eq!(entry.last_recovery_at_ms, Some(2_000));
    assert!(entry.updated_at_ms > 1_000);
}

#[test]
fn clear_removes_and_tolerates_absent_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = log_in(&dir);

    log.mark_run_in_flight(&mark("r1", "main", RunSource::ChatSend))
        .expect("mark");
    log.clear_run_in_flight("r1").expect("clear");
    assert!(log.load().is_empty());

    // Absent and blank ids are no-ops, not errors.
    log.clear_run_in_flight("r1").expect("absent is fine");
    log.clear_run_in_flight("  ").expect("blank is fine");
}

#[test]
fn version_one_files_load_with_default_source() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gateway").join("chat-runs.json");
    std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    std::fs::write(
        &path,
        r#"{
  "version": 1,
  "runs": {
    "legacy-1": {
      "runId": "legacy-1",
      "sessionKey": "main",
      "startedAtMs": 123,
      "updatedAtMs": 123
    }
  }
}"#,
    )
    .expect("write v1 file");

    let log = RunLog::new(path.clone());
    let runs = log.load();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs["legacy-1"].source, RunSource::ChatSend);

    // Any write upgrades the file in place to the current version.
    log.save(&runs).expect("save");
    let raw = std::fs::read_to_string(&path).expect("read back");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value["version"], serde_json::json!(2));
}

#[test]
fn unknown_version_is_an_empty_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gateway").join("chat-runs.json");
    std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    std::fs::write(&path, r#"{"version": 9, "runs": {"x": {}}}"#).expect("write");

    assert!(RunLog::new(path).load().is_empty());
}

#[test]
fn corrupt_file_is_an_empty_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gateway").join("chat-runs.json");
    std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    std::fs::write(&path, "{not json").expect("write");

    assert!(RunLog::new(path).load().is_empty());
}
