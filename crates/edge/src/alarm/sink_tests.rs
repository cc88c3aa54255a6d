// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::memory::MemoryAlarmStore;
use crate::store::{AlarmFilter, Paging};

fn intent(code: &str, ts: i64, severity: u8) -> AlarmIntent {
    AlarmIntent {
        device_id: "dev-1".to_owned(),
        tag_id: "T".to_owned(),
        ts,
        severity,
        code: code.to_owned(),
        message: "over limit".to_owned(),
    }
}

#[tokio::test]
async fn intent_becomes_open_record_with_group() {
    let store = Arc::new(MemoryAlarmStore::new());
    let aggregator = AlarmAggregator::new();
    let events = EventHub::new();

    persist_intent(store.as_ref(), &aggregator, &events, intent("RULE:r1", 1_500, 3)).await;

    let alarms = store.all().await;
    assert_eq!(alarms.len(), 1);
    let a = &alarms[0];
    assert_eq!(a.code, "RULE:r1");
    assert_eq!(a.status, AlarmStatus::Open);
    assert_eq!(a.ts, 1_500);
    assert!(a.group_id.as_deref().unwrap().starts_with("grp-dev-1-r1-"));
    assert_eq!(aggregator.active_groups().len(), 1);
}

#[tokio::test]
async fn duplicate_code_is_suppressed_silently() {
    let store = Arc::new(MemoryAlarmStore::new());
    let aggregator = AlarmAggregator::new();
    let events = EventHub::new();

    persist_intent(store.as_ref(), &aggregator, &events, intent("RULE:r1", 1_000, 3)).await;
    persist_intent(store.as_ref(), &aggregator, &events, intent("RULE:r1", 2_000, 3)).await;

    assert_eq!(store.all().await.len(), 1);
    // The suppressed intent never reached the aggregator.
    assert_eq!(aggregator.active_groups()[0].alarm_count, 1);
}

#[tokio::test]
async fn closed_alarm_reopens_into_same_active_group() {
    let store = Arc::new(MemoryAlarmStore::new());
    let aggregator = AlarmAggregator::new();
    let events = EventHub::new();

    persist_intent(store.as_ref(), &aggregator, &events, intent("RULE:r1", 1_000, 2)).await;
    let first = store.all().await[0].alarm_id.clone();
    store.close(&first).await.unwrap();

    persist_intent(store.as_ref(), &aggregator, &events, intent("RULE:r1", 5_000, 4)).await;

    let open = store
        .query(&AlarmFilter { open_only: true, ..Default::default() }, Paging::default())
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    // The group stayed active and rolled both members.
    let groups = aggregator.active_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].alarm_count, 2);
    assert_eq!(groups[0].severity, 4);
}

#[tokio::test]
async fn events_are_published_for_created_alarms() {
    let store = Arc::new(MemoryAlarmStore::new());
    let aggregator = AlarmAggregator::new();
    let events = EventHub::new();
    let mut rx = events.subscribe();

    persist_intent(store.as_ref(), &aggregator, &events, intent("RULE:r1", 1_000, 3)).await;

    match rx.try_recv().unwrap() {
        EdgeEvent::AlarmCreated { alarm } => assert_eq!(alarm.code, "RULE:r1"),
        other => panic!("expected AlarmCreated, got {other:?}"),
    }
    match rx.try_recv().unwrap() {
        EdgeEvent::AlarmGroupUpdated { group } => assert_eq!(group.alarm_count, 1),
        other => panic!("expected AlarmGroupUpdated, got {other:?}"),
    }
}
