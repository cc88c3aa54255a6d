// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached enabled-rule snapshots, partitioned by family.
//!
//! Snapshots are immutable and published through a watch channel; consumers
//! borrow the current `Arc` once per iteration, so there is no per-sample
//! lock contention. Refresh runs on an interval or on explicit call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::model::{AlarmRule, RuleFamily};
use crate::store::AlarmRuleRepository;

/// Default refresh cadence.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Immutable snapshot of enabled rules, split by family.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    pub threshold: Vec<Arc<AlarmRule>>,
    pub roc: Vec<Arc<AlarmRule>>,
    pub volatility: Vec<Arc<AlarmRule>>,
    pub offline: Vec<Arc<AlarmRule>>,
}

impl RuleSnapshot {
    fn build(rules: Vec<AlarmRule>) -> Self {
        let mut snapshot = Self::default();
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            let rule = Arc::new(rule);
            match rule.family {
                RuleFamily::Threshold => snapshot.threshold.push(rule),
                RuleFamily::Roc => snapshot.roc.push(rule),
                RuleFamily::Volatility => snapshot.volatility.push(rule),
                RuleFamily::Offline => snapshot.offline.push(rule),
            }
        }
        snapshot
    }

    pub fn total(&self) -> usize {
        self.threshold.len() + self.roc.len() + self.volatility.len() + self.offline.len()
    }
}

/// Publishes rule snapshots to the evaluators.
pub struct RuleRegistry {
    repo: Arc<dyn AlarmRuleRepository>,
    tx: watch::Sender<Arc<RuleSnapshot>>,
}

impl RuleRegistry {
    pub fn new(repo: Arc<dyn AlarmRuleRepository>) -> Self {
        let (tx, _) = watch::channel(Arc::new(RuleSnapshot::default()));
        Self { repo, tx }
    }

    /// Subscribe; each evaluator holds one receiver and borrows the
    /// snapshot once per iteration.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RuleSnapshot>> {
        self.tx.subscribe()
    }

    /// Load from the repository and publish a fresh snapshot.
    ///
    /// A repository failure keeps the previous snapshot: evaluators keep
    /// running on the last known-good rules.
    pub async fn refresh(&self) {
        match self.repo.list_enabled().await {
            Ok(rules) => {
                let snapshot = Arc::new(RuleSnapshot::build(rules));
                tracing::debug!(rules = snapshot.total(), "rule snapshot refreshed");
                let _ = self.tx.send(snapshot);
            }
            Err(e) => {
                tracing::warn!(err = %e, "rule refresh failed, keeping previous snapshot");
            }
        }
    }
}

/// Spawn the periodic refresher. The first refresh happens immediately.
pub fn spawn_refresher(
    registry: Arc<RuleRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        registry.refresh().await;
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tick.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            registry.refresh().await;
        }
    });
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
