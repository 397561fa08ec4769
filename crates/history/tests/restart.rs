//! Cooldowns must survive a process restart when the JSONL ledger is used.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use nudge_core::{DeliveryStatus, HistoryKey, RuleKind};
use nudge_history::{HistoryStore, JsonlLedger};

#[tokio::test]
async fn cooldown_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reminder_history.jsonl");
    let key = HistoryKey::new("FC-100", RuleKind::MissingLogtime, "dev@example.com");
    let t0 = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
    let cooldown = Duration::hours(3);

    {
        let store = HistoryStore::new(Arc::new(JsonlLedger::open(&path).unwrap()));
        let claim = store.claim(&key, t0, cooldown).await.unwrap().unwrap();
        claim.record(DeliveryStatus::Success, "delivered").unwrap();
    }

    let store = HistoryStore::new(Arc::new(JsonlLedger::open(&path).unwrap()));
    assert_eq!(store.backend_name(), "jsonl");
    assert!(store
        .claim(&key, t0 + Duration::minutes(30), cooldown)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .claim(&key, t0 + Duration::hours(3), cooldown)
        .await
        .unwrap()
        .is_some());

    let all = store.latest_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].response_summary, "delivered");
}

#[test]
fn each_attempt_is_one_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("h.jsonl");
    let store = HistoryStore::new(Arc::new(JsonlLedger::open(&path).unwrap()));
    let t0 = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
    let assignee = HistoryKey::new("FC-1", RuleKind::PostVersionAlert, "dev@example.com");
    let leader = HistoryKey::new("FC-1", RuleKind::PostVersionAlert, "lead@example.com");

    store.record(&assignee, t0, DeliveryStatus::Failure, "HTTP 503").unwrap();
    store.record(&leader, t0, DeliveryStatus::Success, "ok").unwrap();
    store
        .record(&assignee, t0 + Duration::hours(3), DeliveryStatus::Success, "ok")
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 3);
    assert_eq!(JsonlLedger::read_all(&path).unwrap().len(), 3);
    assert_eq!(store.latest_all().unwrap().len(), 2);
}
