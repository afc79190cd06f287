//! Unit tests for the reply lanes.

use agent_switchboard::gateway::reply_queue::ReplyQueue;

#[tokio::test]
async fn enqueue_then_drain_preserves_order() {
    let queue = ReplyQueue::new();
    queue.enqueue("main", "first").await;
    queue.enqueue("main", "second").await;

    let drained = queue.drain("main").await;
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].text, "first");
    assert_eq!(drained[1].text, "second");

    assert!(queue.drain("main").await.is_empty());
}

#[tokio::test]
async fn lanes_are_independent() {
    let queue = ReplyQueue::new();
    queue.enqueue("a", "for a").await;
    queue.enqueue("b", "for b").await;

    assert_eq!(queue.drain("a").await.len(), 1);
    assert_eq!(queue.pending_total().await, 1);
}

#[tokio::test]
async fn clear_counts_lanes_and_entries() {
    let queue = ReplyQueue::new();
    queue.enqueue("wa:1555", "one").await;
    queue.enqueue("wa:1555", "two").await;
    queue.enqueue("sess-9", "three").await;
    queue.enqueue("unrelated", "keep me").await;

    let cleared = queue.clear_session_queues(&["wa:1555", "sess-9"]).await;
    assert_eq!(cleared.lanes, 2);
    assert_eq!(cleared.entries, 3);

    assert_eq!(queue.pending_total().await, 1);
    assert_eq!(queue.drain("unrelated").await.len(), 1);
}

#[tokio::test]
async fn duplicate_and_empty_candidate_keys_count_once() {
    let queue = ReplyQueue::new();
    queue.enqueue("main", "entry").await;

    // Session key and session id may be the same string; clearing must not
    // double count, and empty keys are ignored.
    let cleared = queue.clear_session_queues(&["main", "main", ""]).await;
    assert_eq!(cleared.lanes, 1);
    assert_eq!(cleared.entries, 1);
}

#[tokio::test]
async fn clearing_unknown_keys_is_zero() {
    let queue = ReplyQueue::new();
    let cleared = queue.clear_session_queues(&["ghost"]).await;
    assert_eq!(cleared.lanes, 0);
    assert_eq!(cleared.entries, 0);
}
