//! Unit tests for domain model serialization and helpers.

use agent_switchboard::models::cron::{CronJob, CronJobSpec, CronSchedule, DeliveryMode, WakeMode};
use agent_switchboard::models::run::{PersistedRun, RunSource};
use agent_switchboard::models::subagent::DescendantRun;
use serde_json::json;

#[test]
fn run_source_serializes_snake_case() {
    assert_eq!(
        serde_json::to_value(RunSource::ChatSend).unwrap(),
        json!("chat_send")
    );
    assert_eq!(
        serde_json::to_value(RunSource::WhatsappAutoReply).unwrap(),
        json!("whatsapp_auto_reply")
    );
    assert_eq!(RunSource::ChatSend.as_str(), "chat_send");
    assert_eq!(RunSource::WhatsappAutoReply.as_str(), "whatsapp_auto_reply");
}

#[test]
fn persisted_run_uses_camel_case_fields() {
    let run = PersistedRun {
        run_id: "r1".into(),
        session_key: "main".into(),
        source: RunSource::ChatSend,
        account_id: None,
        started_at_ms: 100,
        updated_at_ms: 200,
        recovery_attempts: 0,
        last_recovery_at_ms: None,
    };

    let value = serde_json::to_value(&run).unwrap();
    assert_eq!(value["runId"], json!("r1"));
    assert_eq!(value["sessionKey"], json!("main"));
    assert_eq!(value["startedAtMs"], json!(100));
    assert_eq!(value["updatedAtMs"], json!(200));
    // Unset optional bookkeeping is omitted, matching first-registration
    // entries written by older builds.
    assert!(value.get("recoveryAttempts").is_none());
    assert!(value.get("lastRecoveryAtMs").is_none());
    assert!(value.get("accountId").is_none());
}

#[test]
fn persisted_run_without_source_defaults_to_chat_send() {
    let run: PersistedRun = serde_json::from_value(json!({
        "runId": "legacy",
        "sessionKey": "main",
        "startedAtMs": 1,
        "updatedAtMs": 1,
    }))
    .expect("legacy entry parses");
    assert_eq!(run.source, RunSource::ChatSend);
    assert_eq!(run.recovery_attempts, 0);
}

#[test]
fn run_age_is_measured_from_start() {
    let run = PersistedRun {
        run_id: "r1".into(),
        session_key: "main".into(),
        source: RunSource::ChatSend,
        account_id: None,
        started_at_ms: 1_000,
        updated_at_ms: 9_000,
        recovery_attempts: 2,
        last_recovery_at_ms: Some(9_000),
    };
    // Retries refreshed updated_at_ms, but age still counts from the start.
    assert_eq!(run.age_ms(10_000), 9_000);
}

#[test]
fn descendant_run_active_until_ended() {
    let mut run = DescendantRun {
        run_id: "r1".into(),
        child_session_key: "child".into(),
        requester_session_key: "parent".into(),
        created_at_ms: 1,
        ended_at_ms: None,
        end_reason: None,
    };
    assert!(run.is_active());
    run.ended_at_ms = Some(2);
    assert!(!run.is_active());
}

#[test]
fn cron_job_flattens_spec_fields() {
    let job: CronJob = serde_json::from_value(json!({
        "id": "j1",
        "name": "sched:main:review:daily",
        "enabled": true,
        "deleteAfterRun": false,
        "schedule": { "kind": "cron", "expr": "30 18 * * *" },
        "sessionTarget": "main",
        "wakeMode": "next_heartbeat",
        "payload": { "kind": "review" },
        "delivery": "announce",
    }))
    .expect("job parses");

    assert_eq!(job.id, "j1");
    assert_eq!(job.spec.name, "sched:main:review:daily");
    assert_eq!(
        job.spec.schedule,
        CronSchedule::Cron {
            expr: "30 18 * * *".into()
        }
    );
    assert_eq!(job.spec.wake_mode, WakeMode::NextHeartbeat);
    assert_eq!(job.spec.delivery, DeliveryMode::Announce);
}

#[test]
fn full_patch_mirrors_the_spec() {
    let spec = CronJobSpec {
        name: "sched:main:calendar:sync".into(),
        enabled: true,
        delete_after_run: false,
        schedule: CronSchedule::Every { every_ms: 60_000 },
        session_target: "main".into(),
        wake_mode: WakeMode::Now,
        payload: json!({ "kind": "calendar_sync" }),
        delivery: DeliveryMode::Silent,
    };

    let patch = spec.as_patch();
    assert_eq!(patch.name.as_deref(), Some("sched:main:calendar:sync"));
    assert_eq!(patch.enabled, Some(true));
    assert_eq!(patch.schedule, Some(CronSchedule::Every { every_ms: 60_000 }));
    assert_eq!(patch.delivery, Some(DeliveryMode::Silent));
}

#[test]
fn schedule_kinds_serialize_with_tag() {
    assert_eq!(
        serde_json::to_value(CronSchedule::At { at_ms: 5 }).unwrap(),
        json!({ "kind": "at", "at_ms": 5 })
    );
    assert_eq!(
        serde_json::to_value(CronSchedule::Every { every_ms: 9 }).unwrap(),
        json!({ "kind": "every", "every_ms": 9 })
    );
}
