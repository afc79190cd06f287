//! Integration tests for the exited-process reaper.

#![cfg(unix)]

use std::process::Stdio;

use agent_switchboard::orchestrator::reaper::reap_once;
use agent_switchboard::registry::{ProcessRegistry, SubagentRegistry};

use super::test_helpers::wait_until;

async fn spawn_short_lived(registry: &ProcessRegistry, scope: &str) -> u32 {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg("exit 0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .process_group(0);
    let child = cmd.spawn().expect("spawn");
    registry.register(scope, child).await.expect("register")
}

#[tokio::test]
async fn reaper_clears_exited_processes_and_closes_runs() {
    let processes = ProcessRegistry::new();
    let subagents = SubagentRegistry::new();

    spawn_short_lived(&processes, "child-x").await;
    subagents.register("r1", "child-x", "parent").await;
    assert_eq!(subagents.active_count().await, 1);

    // The process exits on its own; repeated reap passes catch it.
    let reaped = wait_until(5_000, || async {
        reap_once(&processes, &subagents).await;
        processes.live_count().await == 0 && subagents.active_count().await == 0
    })
    .await;
    assert!(reaped, "exited process must be reaped and its runs closed");

    let runs = subagents.find_by_requester("parent").await;
    assert_eq!(runs[0].end_reason.as_deref(), Some("exited"));

    // The registry entry is pruned entirely.
    assert!(processes.snapshot().await.is_empty());
}

#[tokio::test]
async fn reaper_leaves_live_processes_alone() {
    let processes = ProcessRegistry::new();
    let subagents = SubagentRegistry::new();

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg("exec sleep 30")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .process_group(0);
    let child = cmd.spawn().expect("spawn");
    let pid = processes.register("main", child).await.expect("register");

    reap_once(&processes, &subagents).await;
    assert_eq!(processes.live_count().await, 1);

    // Clean up.
    processes.force_kill_tree(pid).await;
}
