// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end alarm scenarios over the real evaluators, sink, stores, and
//! pipeline components.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use edge_specs::{offline_rule, roc_rule, sample, threshold_rule, Scenario};
use intellimaint_edge::model::rule::RocMetric;
use intellimaint_edge::model::{AlarmStatus, ConditionOp};
use intellimaint_edge::persist::batch::{BatchWriter, WriterConfig};
use intellimaint_edge::persist::overflow::{OverflowConfig, OverflowSink};
use intellimaint_edge::pipeline::dispatch::{DispatchTarget, Dispatcher};
use intellimaint_edge::pipeline::SamplePipeline;
use intellimaint_edge::store::memory::MemoryTelemetryStore;
use intellimaint_edge::store::TelemetryRepository;

// -- S1: threshold fire with dedup --------------------------------------------

#[tokio::test]
async fn s1_threshold_fires_once_and_dedups() {
    let rig = Scenario::new(vec![threshold_rule(
        "r1",
        "T",
        ConditionOp::Gt,
        80.0,
        0,
        60_000,
    )])
    .await;

    rig.feed(&sample("D", "T", 1_000, 70.0)).await;
    rig.feed(&sample("D", "T", 1_500, 82.0)).await;
    rig.feed(&sample("D", "T", 2_000, 90.0)).await; // dedup: no new record

    let alarms = rig.settle().await;
    assert_eq!(alarms.len(), 1);
    let a = &alarms[0];
    assert_eq!(a.code, "RULE:r1");
    assert_eq!(a.ts, 1_500);
    assert_eq!(a.severity, 3);
    assert_eq!(a.status, AlarmStatus::Open);
}

// -- S2: duration gate ---------------------------------------------------------

#[tokio::test]
async fn s2_duration_gate_delays_fire() {
    let rig = Scenario::new(vec![threshold_rule(
        "r2",
        "T",
        ConditionOp::Gt,
        100.0,
        2_000,
        60_000,
    )])
    .await;

    rig.feed(&sample("D", "T", 1_000, 110.0)).await; // arms, must not fire
    rig.feed(&sample("D", "T", 3_500, 110.0)).await; // ≥ 2 s armed

    let alarms = rig.settle().await;
    assert_eq!(alarms.len(), 1);
    assert!(alarms[0].ts >= 3_000, "fired at {} before the gate opened", alarms[0].ts);
}

// -- S3: RoC percent -----------------------------------------------------------

#[tokio::test]
async fn s3_roc_percent_fires() {
    let rig = Scenario::new(vec![roc_rule("r3", "T", RocMetric::Percent, 25.0, 60_000)]).await;

    // 100 → 130 within the window: 30 % ≥ 25 %.
    rig.feed(&sample("D", "T", 0, 100.0)).await;
    rig.feed(&sample("D", "T", 10_000, 130.0)).await;

    let alarms = rig.settle().await;
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].code, "RULE:r3");
}

// -- S4: aggregation -----------------------------------------------------------

#[tokio::test]
async fn s4_alarms_aggregate_by_device_and_rule() {
    use intellimaint_edge::alarm::aggregate::AlarmAggregator;
    use intellimaint_edge::model::AlarmRecord;

    let aggregator = AlarmAggregator::new();
    let severities = [2u8, 3, 2];
    let mut group = None;
    for (i, sev) in severities.iter().enumerate() {
        let ts = 1_000 + i as i64;
        group = Some(aggregator.aggregate(&AlarmRecord {
            alarm_id: format!("a{i}"),
            device_id: "D".to_owned(),
            tag_id: "T".to_owned(),
            ts,
            severity: *sev,
            code: "RULE:r1".to_owned(),
            message: "over".to_owned(),
            status: AlarmStatus::Open,
            created_utc: ts,
            updated_utc: ts,
            group_id: None,
            ack_user: None,
            ack_note: None,
        }));
    }

    let group = group.unwrap();
    assert_eq!(group.alarm_count, 3);
    assert_eq!(group.severity, 3);
    assert_eq!(group.first_occurred_utc, 1_000);
    assert_eq!(group.last_occurred_utc, 1_002);
    assert_eq!(aggregator.active_groups().len(), 1);
}

// -- S5: dispatcher slow consumer ----------------------------------------------

#[tokio::test(start_paused = true)]
async fn s5_slow_writer_drops_locally_threshold_still_sees_sample() {
    let pipeline = Arc::new(SamplePipeline::new(100));
    let (writer_target, _writer_rx) = DispatchTarget::bounded("writer", 1);
    let (threshold_target, mut threshold_rx) = DispatchTarget::bounded("threshold", 8);
    let dispatcher = Dispatcher::new(
        Arc::clone(&pipeline),
        vec![Arc::clone(&writer_target), Arc::clone(&threshold_target)],
    );

    // First sample fills the never-drained writer queue; second hits the
    // 10 ms slow path and is dropped for the writer only.
    dispatcher.dispatch(sample("D", "T", 1_000, 1.0)).await;
    dispatcher.dispatch(sample("D", "T", 1_100, 2.0)).await;

    assert_eq!(threshold_rx.recv().await.map(|s| s.ts), Some(1_000));
    assert_eq!(threshold_rx.recv().await.map(|s| s.ts), Some(1_100));

    assert_eq!(writer_target.counters().dropped, 1);
    assert_eq!(threshold_target.counters().dropped, 0);
    // The pipeline's own counters are untouched by a target-local drop.
    assert_eq!(pipeline.counters().total_dropped, 0);
}

// -- S6: overflow path ---------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn s6_exhausted_writer_lands_batch_in_overflow_csv() {
    let repo = Arc::new(MemoryTelemetryStore::new());
    repo.set_fail_appends(true); // every attempt fails

    let dir = tempfile::tempdir().unwrap();
    let overflow = Arc::new(OverflowSink::new(
        OverflowConfig {
            dir: dir.path().to_path_buf(),
            roll_size_mb: 64,
            retention_days: 7,
            compress: false,
        },
        None,
    ));
    let writer = BatchWriter::new(
        Arc::clone(&repo) as Arc<dyn TelemetryRepository>,
        Arc::clone(&overflow),
        WriterConfig { batch_size: 2, flush_ms: 60_000, max_retries: 2, initial_retry_ms: 50 },
    );

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&writer).run(rx, cancel.clone()));

    tx.send(sample("D", "T", 1_000, 1.5)).await.unwrap();
    tx.send(sample("D", "T", 1_001, 2.5)).await.unwrap();
    while writer.metrics().overflowed < 2 {
        tokio::time::advance(std::time::Duration::from_millis(50)).await;
    }
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(writer.metrics().overflowed, 2);
    assert_eq!(overflow.overflowed(), 2);

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert!(content.starts_with("DeviceId,TagId,Ts,Seq,ValueType,Value,Quality,Source,Protocol"));
    assert!(content.contains("D,T,1000,1000,Float32,1.5,192,writer,simulated"));
    assert!(content.contains("D,T,1001,1001,Float32,2.5,192,writer,simulated"));
}

// -- Offline detection ---------------------------------------------------------

#[tokio::test]
async fn offline_rule_fires_after_silence() {
    let rig = Scenario::new(vec![offline_rule("o1", "T", "D", 300.0)]).await;
    eprintln!("A: scenario built");

    tokio::time::timeout(std::time::Duration::from_secs(2), rig.feed(&sample("D", "T", 100_000, 50.0))).await.expect("feed1 timed out");
    eprintln!("B: fed");
    tokio::time::timeout(std::time::Duration::from_secs(2), rig.sweep_offline(100_000 + 299_000)).await.expect("sweep1 timed out"); // quiet, still inside timeout
    eprintln!("C: swept1");
    tokio::time::timeout(std::time::Duration::from_secs(2), rig.sweep_offline(100_000 + 301_000)).await.expect("sweep2 timed out"); // past the 300 s timeout
    eprintln!("D: swept2");

    let alarms = tokio::time::timeout(std::time::Duration::from_secs(2), rig.settle()).await.expect("settle timed out");
    eprintln!("E: settled, alarms={}", alarms.len());
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].code, "OFFLINE:o1");
    assert_eq!(alarms[0].device_id, "D");
}

// -- Volatility ----------------------------------------------------------------

#[tokio::test]
async fn volatility_rule_fires_on_windowed_stddev() {
    use intellimaint_edge::model::{AlarmRule, RuleFamily};

    let mut rule = threshold_rule("v1", "T", ConditionOp::Gt, 0.0, 0, 60_000);
    rule.family = RuleFamily::Volatility;
    rule.op = None;
    rule.threshold = 10.0;
    let rule: AlarmRule = rule;

    let rig = Scenario::new(vec![rule]).await;
    // Population stddev of {100, 130} is 15 ≥ 10.
    rig.feed(&sample("D", "T", 1_000, 100.0)).await;
    rig.feed(&sample("D", "T", 2_000, 130.0)).await;

    let alarms = rig.settle().await;
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].code, "RULE:v1");
}
