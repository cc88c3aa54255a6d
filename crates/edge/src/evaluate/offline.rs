// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline detector: periodic sweep over Offline rules against the
//! last-data tracker.
//!
//! Offline rule thresholds are authored in seconds; the conversion to
//! milliseconds happens once on the rule (`offline_timeout_ms`). A
//! (device, tag) the tracker has never seen counts as offline for a
//! configured rule. Intents use the `OFFLINE:` code space, isolated from
//! `RULE:` codes for dedup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::evaluate::lastdata::LastDataTracker;
use crate::evaluate::registry::RuleSnapshot;
use crate::evaluate::runtime::RuleRuntime;
use crate::evaluate::try_emit;
use crate::model::{epoch_ms, AlarmIntent, AlarmRule};
use crate::store::AlarmStore;

/// Default sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub struct OfflineDetector {
    rules: watch::Receiver<Arc<RuleSnapshot>>,
    tracker: Arc<LastDataTracker>,
    runtime: Arc<RuleRuntime>,
    store: Arc<dyn AlarmStore>,
    intents: mpsc::Sender<AlarmIntent>,
}

impl OfflineDetector {
    pub fn new(
        rules: watch::Receiver<Arc<RuleSnapshot>>,
        tracker: Arc<LastDataTracker>,
        runtime: Arc<RuleRuntime>,
        store: Arc<dyn AlarmStore>,
        intents: mpsc::Sender<AlarmIntent>,
    ) -> Self {
        Self { rules, tracker, runtime, store, intents }
    }

    /// Sweep loop; `interval` defaults to [`SWEEP_INTERVAL`].
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            self.sweep(epoch_ms()).await;
        }
        tracing::debug!("offline detector stopped");
    }

    /// One sweep at the given clock reading.
    pub async fn sweep(&self, now: i64) {
        let snapshot = self.rules.borrow().clone();
        for rule in &snapshot.offline {
            self.check_rule(rule, now).await;
        }
    }

    async fn check_rule(&self, rule: &AlarmRule, now: i64) {
        let timeout_ms = rule.offline_timeout_ms();
        if timeout_ms <= 0 {
            return;
        }

        match &rule.device_id {
            Some(device_id) => {
                let age_ms = match self.tracker.get(device_id, &rule.tag_id) {
                    Some(last) => now - last,
                    // Never reported: offline from the first sweep.
                    None => i64::MAX,
                };
                if age_ms >= timeout_ms {
                    self.emit(rule, device_id, age_ms, now).await;
                }
            }
            None => {
                let entries = self.tracker.entries_for_tag(&rule.tag_id);
                if entries.is_empty() {
                    self.emit(rule, "unknown", i64::MAX, now).await;
                    return;
                }
                for (device_id, last) in entries {
                    let age_ms = now - last;
                    if age_ms >= timeout_ms {
                        self.emit(rule, &device_id, age_ms, now).await;
                    }
                }
            }
        }
    }

    async fn emit(&self, rule: &AlarmRule, device_id: &str, age_ms: i64, now: i64) {
        let age_secs = if age_ms == i64::MAX { -1.0 } else { age_ms as f64 / 1000.0 };
        try_emit(
            &self.runtime,
            self.store.as_ref(),
            &self.intents,
            rule,
            device_id,
            &rule.tag_id,
            now,
            age_secs,
        )
        .await;
    }
}

#[cfg(test)]
#[path = "offline_tests.rs"]
mod tests;
