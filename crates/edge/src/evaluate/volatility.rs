// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volatility evaluator: windowed standard deviation against a threshold.
//!
//! Reads the windows the RoC path populates; it never inserts, so a sample
//! seen by both evaluators lands in the window exactly once.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::evaluate::registry::RuleSnapshot;
use crate::evaluate::runtime::RuleRuntime;
use crate::evaluate::try_emit;
use crate::evaluate::window::SlidingWindows;
use crate::model::{AlarmIntent, TypedSample};
use crate::store::AlarmStore;

pub struct VolatilityEvaluator {
    rules: watch::Receiver<Arc<RuleSnapshot>>,
    windows: Arc<SlidingWindows>,
    runtime: Arc<RuleRuntime>,
    store: Arc<dyn AlarmStore>,
    intents: mpsc::Sender<AlarmIntent>,
}

impl VolatilityEvaluator {
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
        tracing::debug!("volatility evaluator stopped");
    }

    pub async fn evaluate(&self, sample: &TypedSample) {
        if sample.scalar().is_none() {
            return;
        }
        let snapshot = self.rules.borrow().clone();

        for rule in &snapshot.volatility {
            if !rule.matches(&sample.device_id, &sample.tag_id) {
                continue;
            }
            let Some(stats) = self.windows.stats(
                &sample.device_id,
                &sample.tag_id,
                rule.roc_window_ms,
                sample.ts,
            ) else {
                continue;
            };
            if stats.count < 2 || stats.stddev < rule.threshold {
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
                stats.stddev,
            )
            .await;
        }
    }
}

#[cfg(test)]
#[path = "volatility_tests.rs"]
mod tests;
