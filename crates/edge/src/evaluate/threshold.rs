// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Threshold evaluator: per-rule duration gate, debounce, open-alarm dedup.
//!
//! State machine per (rule, device):
//!
//! ```text
//! Idle ──(cond true)──▶ Armed(start = sample ts)
//! Armed ──(cond false)──▶ Idle
//! Armed ──(cond true, ts − start ≥ duration)──▶ FireCandidate
//! FireCandidate ──(debounced or open alarm exists)──▶ Idle, no emit
//! FireCandidate ──(otherwise)──▶ emit, Idle
//! ```
//!
//! The gate clears on every fire candidate, emitted or suppressed.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::evaluate::registry::RuleSnapshot;
use crate::evaluate::runtime::{GateKey, RuleRuntime};
use crate::evaluate::try_emit;
use crate::model::{AlarmIntent, TypedSample};
use crate::store::AlarmStore;

pub struct ThresholdEvaluator {
    rules: watch::Receiver<Arc<RuleSnapshot>>,
    runtime: Arc<RuleRuntime>,
    store: Arc<dyn AlarmStore>,
    intents: mpsc::Sender<AlarmIntent>,
}

impl ThresholdEvaluator {
    pub fn new(
        rules: watch::Receiver<Arc<RuleSnapshot>>,
        runtime: Arc<RuleRuntime>,
        store: Arc<dyn AlarmStore>,
        intents: mpsc::Sender<AlarmIntent>,
    ) -> Self {
        Self { rules, runtime, store, intents }
    }

    /// Consume the dispatcher target until cancelled.
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
        tracing::debug!("threshold evaluator stopped");
    }

    /// Evaluate one sample against every matching threshold rule.
    pub async fn evaluate(&self, sample: &TypedSample) {
        let Some(value) = sample.scalar() else {
            // Byte arrays and unparsable strings carry no scalar.
            return;
        };
        let snapshot = self.rules.borrow().clone();

        for rule in &snapshot.threshold {
            if !rule.matches(&sample.device_id, &sample.tag_id) {
                continue;
            }
            let Some(op) = rule.op else { continue };
            let gate: GateKey = (rule.rule_id.clone(), sample.device_id.clone());

            if !op.eval(value, rule.threshold) {
                self.runtime.disarm(&gate);
                continue;
            }

            let started = self.runtime.arm(gate.clone(), sample.ts);
            if sample.ts - started < rule.duration_ms {
                continue; // still arming
            }

            self.runtime.disarm(&gate);
            try_emit(
                &self.runtime,
                self.store.as_ref(),
                &self.intents,
                rule,
                &sample.device_id,
                &sample.tag_id,
                sample.ts,
                value,
            )
            .await;
        }
    }
}

#[cfg(test)]
#[path = "threshold_tests.rs"]
mod tests;
