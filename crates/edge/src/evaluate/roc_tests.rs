// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::mpsc;

use super::*;
use crate::evaluate::registry::RuleRegistry;
use crate::model::{AlarmRule, RuleFamily, SampleValue, ValueType};
use crate::store::memory::{MemoryAlarmStore, MemoryRuleStore};

fn roc_rule(id: &str, metric: RocMetric, threshold: f64, window_ms: i64) -> AlarmRule {
    AlarmRule {
        rule_id: id.to_owned(),
        name: format!("roc {id}"),
        device_id: None,
        tag_id: "T".to_owned(),
        family: RuleFamily::Roc,
        op: None,
        roc_metric: Some(metric),
        threshold,
        threshold_high: None,
        severity: 4,
        enabled: true,
        debounce_ms: 60_000,
        duration_ms: 0,
        roc_window_ms: window_ms,
        message_template: None,
    }
}

fn sample(ts: i64, value: f64) -> TypedSample {
    TypedSample {
        device_id: "dev-1".to_owned(),
        tag_id: "T".to_owned(),
        ts,
        seq: ts as u64,
        value_type: ValueType::Float64,
        value: SampleValue::Float64(value),
        quality: 192,
        unit: None,
        protocol: "simulated".to_owned(),
    }
}

async fn evaluator(
    rules: Vec<AlarmRule>,
) -> (RocEvaluator, Arc<SlidingWindows>, mpsc::Receiver<AlarmIntent>) {
    let registry = RuleRegistry::new(Arc::new(MemoryRuleStore::new(rules)));
    let rx = registry.subscribe();
    registry.refresh().await;
    let windows = Arc::new(SlidingWindows::default());
    let (tx, intents) = mpsc::channel(16);
    let ev = RocEvaluator::new(
        rx,
        Arc::clone(&windows),
        RuleRuntime::new(),
        Arc::new(MemoryAlarmStore::new()) as Arc<dyn AlarmStore>,
        tx,
    );
    (ev, windows, intents)
}

#[tokio::test]
async fn percent_change_fires_above_threshold() {
    let (ev, _, mut intents) =
        evaluator(vec![roc_rule("r3", RocMetric::Percent, 25.0, 60_000)]).await;

    ev.evaluate(&sample(0, 100.0)).await;
    assert!(intents.try_recv().is_err()); // single point: no RoC yet

    // 100 → 130 inside the window is a 30 % change.
    ev.evaluate(&sample(10_000, 130.0)).await;
    let intent = intents.try_recv().unwrap();
    assert_eq!(intent.code, "RULE:r3");
    assert_eq!(intent.severity, 4);
}

#[tokio::test]
async fn absolute_change_below_threshold_stays_quiet() {
    let (ev, _, mut intents) =
        evaluator(vec![roc_rule("r4", RocMetric::Absolute, 50.0, 60_000)]).await;

    ev.evaluate(&sample(0, 100.0)).await;
    ev.evaluate(&sample(10_000, 130.0)).await; // Δ = 30 < 50
    assert!(intents.try_recv().is_err());

    ev.evaluate(&sample(20_000, 160.0)).await; // Δ = 60 ≥ 50
    assert!(intents.try_recv().is_ok());
}

#[tokio::test]
async fn every_numeric_sample_is_ingested_into_windows() {
    // No rules at all: ingestion still happens (volatility depends on it).
    let (ev, windows, _) = evaluator(vec![]).await;

    ev.evaluate(&sample(1_000, 1.0)).await;
    ev.evaluate(&sample(2_000, 2.0)).await;
    assert_eq!(windows.len("dev-1", "T"), 2);
}

#[tokio::test]
async fn repeated_trigger_is_debounced() {
    let (ev, _, mut intents) =
        evaluator(vec![roc_rule("r3", RocMetric::Percent, 25.0, 60_000)]).await;

    ev.evaluate(&sample(0, 100.0)).await;
    ev.evaluate(&sample(10_000, 130.0)).await;
    assert!(intents.try_recv().is_ok());

    // Still above threshold 5 s later, but inside the 60 s debounce.
    ev.evaluate(&sample(15_000, 140.0)).await;
    assert!(intents.try_recv().is_err());
}
