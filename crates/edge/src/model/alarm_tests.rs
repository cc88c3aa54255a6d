// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn extract_takes_suffix_after_first_colon() {
    assert_eq!(extract_rule_id("RULE:r1"), "r1");
    assert_eq!(extract_rule_id("OFFLINE:pump-7"), "pump-7");
    // Only the first colon splits; the rest is sanitized.
    assert_eq!(extract_rule_id("RULE:a:b"), "a_b");
}

#[test]
fn extract_uses_whole_code_without_colon() {
    assert_eq!(extract_rule_id("legacy_code"), "legacy_code");
}

#[test]
fn extract_sanitizes_unexpected_characters() {
    assert_eq!(extract_rule_id("RULE:r 1/x"), "r_1_x");
    assert_eq!(extract_rule_id("RULE:Ok_Name-9"), "Ok_Name-9");
}

#[test]
fn status_activity() {
    assert!(AlarmStatus::Open.is_active());
    assert!(AlarmStatus::Acknowledged.is_active());
    assert!(!AlarmStatus::Closed.is_active());
}

#[test]
fn status_ordering_is_monotonic() {
    assert!(AlarmStatus::Open < AlarmStatus::Acknowledged);
    assert!(AlarmStatus::Acknowledged < AlarmStatus::Closed);
}
