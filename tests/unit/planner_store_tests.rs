//! Unit tests for the planner store.

use agent_switchboard::models::now_ms;
use agent_switchboard::persistence::planner_store::{PlannerStore, WaitingItem};

fn store_in(dir: &tempfile::TempDir) -> PlannerStore {
    PlannerStore::new(dir.path().join("planner.json"))
}

fn waiting(id: &str, target: Option<&str>, follow_up_at_ms: i64) -> WaitingItem {
    WaitingItem {
        id: id.into(),
        title: format!("item {id}"),
        target: target.map(Into::into),
        follow_up_at_ms,
        cadence_hours: None,
        created_at_ms: now_ms(),
    }
}

#[test]
fn empty_store_loads_default_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = store_in(&dir).load().expect("load");
    assert!(state.waiting.is_empty());
    assert!(state.actions.is_empty());
}

#[test]
fn add_find_resolve_waiting() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    store
        .add_waiting(waiting("w1", Some("+49123"), 1_000))
        .expect("add");
    let found = store.find_waiting("w1").expect("find").expect("present");
    assert_eq!(found.target.as_deref(), Some("+49123"));

    assert!(store.resolve_waiting("w1").expect("resolve"));
    assert!(store.find_waiting("w1").expect("find").is_none());
    assert!(!store.resolve_waiting("w1").expect("second resolve is no-op"));
}

#[test]
fn adding_same_id_replaces_the_item() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    store.add_waiting(waiting("w1", None, 1_000)).expect("add");
    store
        .add_waiting(waiting("w1", Some("+1555"), 2_000))
        .expect("replace");

    let state = store.load().expect("load");
    assert_eq!(state.waiting.len(), 1);
    assert_eq!(state.waiting[0].follow_up_at_ms, 2_000);
}

#[test]
fn push_out_and_advance_move_the_follow_up_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);
    store.add_waiting(waiting("w1", None, 1_000)).expect("add");

    let before = now_ms();
    store.push_followup_out("w1", 30).expect("push out");
    let pushed = store.find_waiting("w1").expect("find").expect("present");
    assert!(pushed.follow_up_at_ms >= before + 29 * 60_000);

    store.advance_followup("w1", 72).expect("advance");
    let advanced = store.find_waiting("w1").expect("find").expect("present");
    assert!(advanced.follow_up_at_ms >= before + 71 * 3_600_000);
}

#[test]
fn action_items_accumulate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    let first = store
        .add_action_item("Calendar sync is failing", "calendar-sync")
        .expect("add");
    store
        .add_action_item("Draft follow-up for \"invoice\"", "followup")
        .expect("add");

    let state = store.load().expect("load");
    assert_eq!(state.actions.len(), 2);
    assert_eq!(state.actions[0].id, first.id);
    assert_eq!(state.actions[0].origin, "calendar-sync");
}
