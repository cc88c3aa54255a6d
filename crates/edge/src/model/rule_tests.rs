// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn rule(family: RuleFamily) -> AlarmRule {
    AlarmRule {
        rule_id: "r1".to_owned(),
        name: "high temp".to_owned(),
        device_id: None,
        tag_id: "T".to_owned(),
        family,
        op: Some(ConditionOp::Gt),
        roc_metric: None,
        threshold: 80.0,
        threshold_high: None,
        severity: 3,
        enabled: true,
        debounce_ms: 5_000,
        duration_ms: 0,
        roc_window_ms: 60_000,
        message_template: None,
    }
}

#[test]
fn op_eval_basics() {
    assert!(ConditionOp::Gt.eval(81.0, 80.0));
    assert!(!ConditionOp::Gt.eval(80.0, 80.0));
    assert!(ConditionOp::Gte.eval(80.0, 80.0));
    assert!(ConditionOp::Lt.eval(79.0, 80.0));
    assert!(ConditionOp::Lte.eval(80.0, 80.0));
}

#[test]
fn eq_ne_use_tolerance() {
    // 5e-10 is below the 1e-9 tolerance: treated as equal.
    assert!(ConditionOp::Eq.eval(80.0 + 5e-10, 80.0));
    assert!(!ConditionOp::Ne.eval(80.0 + 5e-10, 80.0));
    assert!(ConditionOp::Ne.eval(80.0 + 1e-8, 80.0));
}

#[test]
fn code_prefix_by_family() {
    assert_eq!(rule(RuleFamily::Threshold).code(), "RULE:r1");
    assert_eq!(rule(RuleFamily::Roc).code(), "RULE:r1");
    assert_eq!(rule(RuleFamily::Offline).code(), "OFFLINE:r1");
}

#[test]
fn matches_honors_device_filter() {
    let mut r = rule(RuleFamily::Threshold);
    assert!(r.matches("any-device", "T"));
    assert!(!r.matches("any-device", "other"));

    r.device_id = Some("dev-1".to_owned());
    assert!(r.matches("dev-1", "T"));
    assert!(!r.matches("dev-2", "T"));
}

#[test]
fn offline_threshold_is_seconds() {
    let mut r = rule(RuleFamily::Offline);
    r.threshold = 300.0;
    assert_eq!(r.offline_timeout_ms(), 300_000);
}

#[test]
fn message_template_substitution() {
    let mut r = rule(RuleFamily::Threshold);
    r.message_template = Some("{tag} on {device} hit {value}".to_owned());
    let msg = r.render_message("dev-1", "T", 91.5);
    assert_eq!(msg, "T on dev-1 hit 91.5000");
}

#[test]
fn op_parse() {
    assert_eq!(ConditionOp::parse("gte"), Some(ConditionOp::Gte));
    assert_eq!(ConditionOp::parse("between"), None);
}
