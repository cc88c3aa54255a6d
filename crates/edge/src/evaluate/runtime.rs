// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral per-rule evaluation state: duration-gate starts and debounce
//! timestamps. Entries idle for more than a day are swept periodically so
//! deleted rules and retired tags do not pin memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Entries untouched this long are swept.
const IDLE_TTL_MS: i64 = 24 * 3_600_000;
/// Sweep cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// `(rule_id, device_id)`: duration gates are tracked per device so one
/// rule matching a fleet of devices arms independently per device.
pub type GateKey = (String, String);

#[derive(Clone, Copy)]
struct Stamped {
    value_ms: i64,
    touched_ms: i64,
}

/// Shared runtime state for every evaluator.
#[derive(Default)]
pub struct RuleRuntime {
    condition_start: Mutex<HashMap<GateKey, Stamped>>,
    last_emit: Mutex<HashMap<String, Stamped>>,
}

impl RuleRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arm (or keep) the duration gate; returns the condition start.
    pub fn arm(&self, key: GateKey, now: i64) -> i64 {
        let mut map = lock(&self.condition_start);
        let entry = map
            .entry(key)
            .or_insert(Stamped { value_ms: now, touched_ms: now });
        entry.touched_ms = now;
        entry.value_ms
    }

    /// Disarm the duration gate (condition went false or fired).
    pub fn disarm(&self, key: &GateKey) {
        lock(&self.condition_start).remove(key);
    }

    /// Whether an emission for `code` is still inside its debounce window.
    pub fn debounced(&self, code: &str, now: i64, debounce_ms: i64) -> bool {
        let map = lock(&self.last_emit);
        match map.get(code) {
            Some(stamp) => now - stamp.value_ms < debounce_ms,
            None => false,
        }
    }

    /// Record an emission (or an open-alarm sighting) for debounce.
    pub fn note_emission(&self, code: &str, now: i64) {
        lock(&self.last_emit)
            .insert(code.to_owned(), Stamped { value_ms: now, touched_ms: now });
    }

    /// Drop entries idle for longer than the TTL. Returns removed count.
    pub fn sweep(&self, now: i64) -> usize {
        let mut removed = 0;
        {
            let mut map = lock(&self.condition_start);
            let before = map.len();
            map.retain(|_, s| now - s.touched_ms <= IDLE_TTL_MS);
            removed += before - map.len();
        }
        {
            let mut map = lock(&self.last_emit);
            let before = map.len();
            map.retain(|_, s| now - s.touched_ms <= IDLE_TTL_MS);
            removed += before - map.len();
        }
        removed
    }
}

fn lock<K, V>(m: &Mutex<HashMap<K, V>>) -> std::sync::MutexGuard<'_, HashMap<K, V>> {
    match m.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

/// Spawn the idle-state sweeper.
pub fn spawn_state_sweeper(runtime: Arc<RuleRuntime>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            let removed = runtime.sweep(crate::model::epoch_ms());
            if removed > 0 {
                tracing::debug!(removed, "swept idle rule state");
            }
        }
    });
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
