// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alarm sink: turns evaluator intents into persisted records and folds
//! them into aggregation groups.

pub mod aggregate;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::events::{EdgeEvent, EventHub};
use crate::model::{epoch_ms, AlarmIntent, AlarmRecord, AlarmStatus};
use crate::store::AlarmStore;
use aggregate::AlarmAggregator;

/// Consume alarm intents until cancelled. Each intent becomes a record;
/// a store-level open-code violation means another path won the race and
/// the intent is suppressed silently.
pub async fn run_alarm_sink(
    store: Arc<dyn AlarmStore>,
    aggregator: Arc<AlarmAggregator>,
    events: Arc<EventHub>,
    mut intents: mpsc::Receiver<AlarmIntent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            intent = intents.recv() => match intent {
                Some(intent) => {
                    persist_intent(store.as_ref(), &aggregator, &events, intent).await;
                }
                None => { eprintln!("sink: channel closed"); break; },
            }
        }
    }
    eprintln!("sink: loop exited, draining");
    // Drain what the evaluators emitted before cancellation.
    while let Ok(intent) = intents.try_recv() {
        persist_intent(store.as_ref(), &aggregator, &events, intent).await;
    }
    tracing::debug!("alarm sink stopped");
}

async fn persist_intent(
    store: &dyn AlarmStore,
    aggregator: &AlarmAggregator,
    events: &EventHub,
    intent: AlarmIntent,
) {
    let now = epoch_ms();
    let mut record = AlarmRecord {
        alarm_id: uuid::Uuid::new_v4().to_string(),
        device_id: intent.device_id,
        tag_id: intent.tag_id,
        ts: intent.ts,
        severity: intent.severity,
        code: intent.code,
        message: intent.message,
        status: AlarmStatus::Open,
        created_utc: now,
        updated_utc: now,
        group_id: None,
        ack_user: None,
        ack_note: None,
    };

    match store.create(record.clone()).await {
        Ok(()) => {}
        Err(StoreError::OpenAlarmExists(code)) => {
            tracing::debug!(code = %code, "alarm already open, intent suppressed");
            return;
        }
        Err(e) => {
            tracing::warn!(code = %record.code, err = %e, "alarm create failed");
            return;
        }
    }

    let group = aggregator.aggregate(&record);
    if let Err(e) = store.set_group(&record.alarm_id, &group.group_id).await {
        tracing::warn!(alarm = %record.alarm_id, err = %e, "group link failed");
    } else {
        record.group_id = Some(group.group_id.clone());
    }

    tracing::info!(
        code = %record.code,
        device = %record.device_id,
        severity = record.severity,
        group = %group.group_id,
        "alarm created"
    );
    events.publish(EdgeEvent::AlarmCreated { alarm: record });
    events.publish(EdgeEvent::AlarmGroupUpdated { group });
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
