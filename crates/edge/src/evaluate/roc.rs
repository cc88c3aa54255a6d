// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate-of-change evaluator.
//!
//! This evaluator is also the sole writer into the shared sliding windows:
//! every numeric sample is ingested before any rule runs, whether or not a
//! RoC rule matches it. The volatility evaluator reads the same windows and
//! must not insert again.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::evaluate::registry::RuleSnapshot;
use crate::evaluate::runtime::RuleRuntime;
use crate::evaluate::try_emit;
use crate::evaluate::window::SlidingWindows;
use crate::model::{AlarmIntent, RocMetric, TypedSample};
use crate::store::AlarmStore;

pub struct RocEvaluator {
    rules: watch::Receiver<Arc<RuleSnapshot>>,
    windows: Arc<SlidingWindows>,
    runtime: Arc<RuleRuntime>,
    store: Arc<dyn AlarmStore>,
    intents: mpsc::Sender<AlarmIntent>,
}

impl RocEvaluator {
    pub fn new(
        rules: watch::Receiver<Arc<RuleSnapshot>>,
        windows: Arc<SlidingWindows>,
        runtime: Arc<RuleRuntime>,
        store: Arc<dyn AlarmStore>,
        intents: mpsc::Sender<AlarmIntent>,
    ) -> Self {
        Self { rules, windows, runtime, store, intents }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<TypedSample>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                sample = rx.recv() => match sample {
                    Some(sample) => self.evaluate(&sample).await,
                    None => break,
                }
            }
        }
        tracing::debug!("roc evaluator stopped");
    }

    pub async fn evaluate(&self, sample: &TypedSample) {
        let Some(value) = sample.scalar() else { return };
        self.windows.insert(&sample.device_id, &sample.tag_id, sample.ts, value);

        let snapshot = self.rules.borrow().clone();
        for rule in &snapshot.roc {
            if !rule.matches(&sample.device_id, &sample.tag_id) {
                continue;
            }
            let Some(roc) = self.windows.rate_of_change(
                &sample.device_id,
                &sample.tag_id,
                rule.roc_window_ms,
                sample.ts,
            ) else {
                continue; // fewer than two points in the window
            };

            let metric = match rule.roc_metric.unwrap_or(RocMetric::Absolute) {
                RocMetric::Absolute => roc.absolute_change,
                RocMetric::Percent => roc.percent_change,
            };
            if metric < rule.threshold {
                continue;
            }
            try_emit(
                &self.runtime,
                self.store.as_ref(),
                &self.intents,
                rule,
                &sample.device_id,
                &sample.tag_id,
                sample.ts,
                metric,
            )
            .await;
        }
    }
}

#[cfg(test)]
#[path = "roc_tests.rs"]
mod tests;
