// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end alarm scenarios.
//!
//! Wires the real evaluators, alarm sink, aggregator, and in-memory stores
//! together; tests feed hand-built samples and assert on what the stores
//! end up holding.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use intellimaint_edge::alarm::aggregate::AlarmAggregator;
use intellimaint_edge::alarm::run_alarm_sink;
use intellimaint_edge::evaluate::lastdata::LastDataTracker;
use intellimaint_edge::evaluate::offline::OfflineDetector;
use intellimaint_edge::evaluate::registry::RuleRegistry;
use intellimaint_edge::evaluate::roc::RocEvaluator;
use intellimaint_edge::evaluate::runtime::RuleRuntime;
use intellimaint_edge::evaluate::threshold::ThresholdEvaluator;
use intellimaint_edge::evaluate::volatility::VolatilityEvaluator;
use intellimaint_edge::evaluate::window::SlidingWindows;
use intellimaint_edge::events::EventHub;
use intellimaint_edge::model::{
    AlarmRecord, AlarmRule, ConditionOp, RuleFamily, SampleValue, TypedSample, ValueType,
};
use intellimaint_edge::model::rule::RocMetric;
use intellimaint_edge::store::memory::{MemoryAlarmStore, MemoryRuleStore};
use intellimaint_edge::store::AlarmStore;

/// A fully wired evaluation rig over in-memory stores.
pub struct Scenario {
    pub alarms: Arc<MemoryAlarmStore>,
    pub aggregator: Arc<AlarmAggregator>,
    pub tracker: Arc<LastDataTracker>,
    pub windows: Arc<SlidingWindows>,
    threshold: ThresholdEvaluator,
    roc: RocEvaluator,
    volatility: VolatilityEvaluator,
    offline: OfflineDetector,
    sink: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Scenario {
    pub async fn new(rules: Vec<AlarmRule>) -> Self {
        let alarms = Arc::new(MemoryAlarmStore::new());
        let aggregator = Arc::new(AlarmAggregator::new());
        let tracker = LastDataTracker::new();
        let windows = Arc::new(SlidingWindows::default());
        let runtime = RuleRuntime::new();
        let events = Arc::new(EventHub::new());

        let registry = RuleRegistry::new(Arc::new(MemoryRuleStore::new(rules)));
        let rx = registry.subscribe();
        registry.refresh().await;

        let (intent_tx, intent_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let sink = tokio::spawn(run_alarm_sink(
            Arc::clone(&alarms) as Arc<dyn AlarmStore>,
            Arc::clone(&aggregator),
            events,
            intent_rx,
            cancel.clone(),
        ));

        let store = Arc::clone(&alarms) as Arc<dyn AlarmStore>;
        Self {
            threshold: ThresholdEvaluator::new(
                rx.clone(),
                Arc::clone(&runtime),
                Arc::clone(&store),
                intent_tx.clone(),
            ),
            roc: RocEvaluator::new(
                rx.clone(),
                Arc::clone(&windows),
                Arc::clone(&runtime),
                Arc::clone(&store),
                intent_tx.clone(),
            ),
            volatility: VolatilityEvaluator::new(
                rx.clone(),
                Arc::clone(&windows),
                Arc::clone(&runtime),
                Arc::clone(&store),
                intent_tx.clone(),
            ),
            offline: OfflineDetector::new(
                rx,
                Arc::clone(&tracker),
                Arc::clone(&runtime),
                store,
                intent_tx,
            ),
            alarms,
            aggregator,
            tracker,
            windows,
            sink,
            cancel,
        }
    }

    /// Deliver one sample to every evaluator, the way the dispatcher fans
    /// out. The RoC path runs first so windows are populated before the
    /// volatility read, matching the single-writer rule.
    pub async fn feed(&self, sample: &TypedSample) {
        self.tracker.note(&sample.device_id, &sample.tag_id, sample.ts);
        self.roc.evaluate(sample).await;
        self.volatility.evaluate(sample).await;
        self.threshold.evaluate(sample).await;
    }

    /// Run one offline sweep at the given clock reading.
    pub async fn sweep_offline(&self, now: i64) {
        self.offline.sweep(now).await;
    }

    /// Stop the sink after it has drained every pending intent, then
    /// return all persisted alarms sorted by ts.
    pub async fn settle(self) -> Vec<AlarmRecord> {
        // Dropping the evaluators drops the last intent senders; the sink
        // then sees the channel close and exits after draining.
        let Scenario { alarms, sink, cancel, .. } = self;
        eprintln!("settle: evaluators dropped, awaiting sink");
        sink.await.ok();
        eprintln!("settle: sink joined");
        cancel.cancel();

        let mut all = alarms.all().await;
        all.sort_by_key(|a| (a.ts, a.alarm_id.clone()));
        all
    }
}

/// Float32 sample in the shape the collectors emit.
pub fn sample(device: &str, tag: &str, ts: i64, value: f32) -> TypedSample {
    TypedSample {
        device_id: device.to_owned(),
        tag_id: tag.to_owned(),
        ts,
        seq: ts as u64,
        value_type: ValueType::Float32,
        value: SampleValue::Float32(value),
        quality: 192,
        unit: None,
        protocol: "simulated".to_owned(),
    }
}

fn base_rule(id: &str, tag: &str, family: RuleFamily) -> AlarmRule {
    AlarmRule {
        rule_id: id.to_owned(),
        name: format!("rule {id}"),
        device_id: None,
        tag_id: tag.to_owned(),
        family,
        op: None,
        roc_metric: None,
        threshold: 0.0,
        threshold_high: None,
        severity: 3,
        enabled: true,
        debounce_ms: 60_000,
        duration_ms: 0,
        roc_window_ms: 60_000,
        message_template: None,
    }
}

pub fn threshold_rule(
    id: &str,
    tag: &str,
    op: ConditionOp,
    threshold: f64,
    duration_ms: i64,
    debounce_ms: i64,
) -> AlarmRule {
    let mut rule = base_rule(id, tag, RuleFamily::Threshold);
    rule.op = Some(op);
    rule.threshold = threshold;
    rule.duration_ms = duration_ms;
    rule.debounce_ms = debounce_ms;
    rule
}

pub fn roc_rule(id: &str, tag: &str, metric: RocMetric, threshold: f64, window_ms: i64) -> AlarmRule {
    let mut rule = base_rule(id, tag, RuleFamily::Roc);
    rule.roc_metric = Some(metric);
    rule.threshold = threshold;
    rule.roc_window_ms = window_ms;
    rule
}

pub fn offline_rule(id: &str, tag: &str, device: &str, threshold_secs: f64) -> AlarmRule {
    let mut rule = base_rule(id, tag, RuleFamily::Offline);
    rule.device_id = Some(device.to_owned());
    rule.threshold = threshold_secs;
    rule
}
