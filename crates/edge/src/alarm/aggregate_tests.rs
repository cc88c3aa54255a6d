// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn alarm(id: &str, device: &str, code: &str, ts: i64, severity: u8) -> AlarmRecord {
    AlarmRecord {
        alarm_id: id.to_owned(),
        device_id: device.to_owned(),
        tag_id: "T".to_owned(),
        ts,
        severity,
        code: code.to_owned(),
        message: format!("alarm {id}"),
        status: AlarmStatus::Open,
        created_utc: ts,
        updated_utc: ts,
        group_id: None,
        ack_user: None,
        ack_note: None,
    }
}

#[test]
fn three_alarms_roll_into_one_group() {
    let agg = AlarmAggregator::new();
    let severities = [2u8, 3, 2];
    let mut last = None;
    for (i, sev) in severities.iter().enumerate() {
        let a = alarm(&format!("a{i}"), "D", "RULE:r1", 1_000 + i as i64 * 500, *sev);
        last = Some(agg.aggregate(&a));
    }

    let group = last.unwrap();
    assert_eq!(group.alarm_count, 3);
    assert_eq!(group.severity, 3);
    assert_eq!(group.first_occurred_utc, 1_000);
    assert_eq!(group.last_occurred_utc, 2_000);
    assert_eq!(group.rule_id, "r1");
    assert_eq!(group.message, "alarm a2");
    assert_eq!(agg.active_groups().len(), 1);
}

#[test]
fn groups_split_by_device_and_rule() {
    let agg = AlarmAggregator::new();
    agg.aggregate(&alarm("a1", "D1", "RULE:r1", 1_000, 2));
    agg.aggregate(&alarm("a2", "D2", "RULE:r1", 1_000, 2));
    agg.aggregate(&alarm("a3", "D1", "RULE:r2", 1_000, 2));

    assert_eq!(agg.active_groups().len(), 3);
}

#[test]
fn code_without_colon_uses_whole_code() {
    let agg = AlarmAggregator::new();
    let group = agg.aggregate(&alarm("a1", "D", "legacy", 1_000, 1));
    assert_eq!(group.rule_id, "legacy");
}

#[test]
fn closed_group_is_replaced_by_next_alarm() {
    let agg = AlarmAggregator::new();
    let g1 = agg.aggregate(&alarm("a1", "D", "RULE:r1", 1_000, 2));
    agg.close_group(&g1.group_id);
    assert!(agg.active_groups().is_empty());

    let g2 = agg.aggregate(&alarm("a2", "D", "RULE:r1", 5_000, 4));
    assert_ne!(g1.group_id, g2.group_id);
    assert_eq!(g2.alarm_count, 1);
    assert_eq!(g2.severity, 4);
}

#[test]
fn ack_is_monotonic_and_does_not_block_aggregation() {
    let agg = AlarmAggregator::new();
    let g = agg.aggregate(&alarm("a1", "D", "RULE:r1", 1_000, 2));

    assert!(agg.ack_group(&g.group_id).is_some());
    // A second ack is a no-op.
    assert!(agg.ack_group(&g.group_id).is_none());

    // Acknowledged groups still collect members.
    let g2 = agg.aggregate(&alarm("a2", "D", "RULE:r1", 2_000, 5));
    assert_eq!(g2.group_id, g.group_id);
    assert_eq!(g2.alarm_count, 2);
    assert_eq!(g2.severity, 5);

    // Close is still allowed after ack.
    assert!(agg.close_group(&g.group_id).is_some());
}

#[test]
fn group_id_shape() {
    let agg = AlarmAggregator::new();
    let g = agg.aggregate(&alarm("a1", "press-7", "RULE:high temp!", 42, 1));
    assert_eq!(g.group_id, "grp-press-7-high_temp_-42");
    assert_eq!(g.rule_id, "high_temp_");
}
