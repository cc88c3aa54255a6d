// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out dispatcher: replicates pipeline samples to per-consumer queues.
//!
//! Fast path is a `try_send` to every target. Targets that refuse get one
//! short grace (`SLOW_PATH_DEADLINE`), awaited concurrently so a lagging
//! consumer delays the pipeline by at most one deadline, never serially per
//! target. A target that still refuses loses that sample; losses stay local
//! to the target and are counted separately from try-send contention.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::model::TypedSample;
use crate::pipeline::SamplePipeline;

/// Hard per-target grace for the slow path.
pub const SLOW_PATH_DEADLINE: Duration = Duration::from_millis(10);

/// Counter snapshot for one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetCounters {
    pub name: String,
    pub delivered: u64,
    /// try-send refused; the slow path was entered.
    pub contended: u64,
    /// Slow-path deadline expired (or the consumer is gone); sample lost.
    pub dropped: u64,
}

/// One bounded downstream queue.
pub struct DispatchTarget {
    name: &'static str,
    tx: mpsc::Sender<TypedSample>,
    delivered: AtomicU64,
    contended: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchTarget {
    /// Build a target and hand back the consumer side.
    pub fn bounded(
        name: &'static str,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<TypedSample>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let target = Arc::new(Self {
            name,
            tx,
            delivered: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        (target, rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn counters(&self) -> TargetCounters {
        TargetCounters {
            name: self.name.to_owned(),
            delivered: self.delivered.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Reads the pipeline and replicates every sample to all targets.
pub struct Dispatcher {
    pipeline: Arc<SamplePipeline>,
    targets: Vec<Arc<DispatchTarget>>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<SamplePipeline>, targets: Vec<Arc<DispatchTarget>>) -> Self {
        Self { pipeline, targets }
    }

    pub fn target_counters(&self) -> Vec<TargetCounters> {
        self.targets.iter().map(|t| t.counters()).collect()
    }

    /// Dispatch loop; exits when cancelled and the pipeline has drained.
    pub async fn run(&self, cancel: CancellationToken) {
        while let Some(sample) = self.pipeline.recv(&cancel).await {
            self.dispatch(sample).await;
        }
        tracing::debug!("dispatcher stopped");
    }

    /// Replicate one sample to every target.
    pub async fn dispatch(&self, sample: TypedSample) {
        let mut laggards: Vec<(&Arc<DispatchTarget>, TypedSample)> = Vec::new();

        for target in &self.targets {
            match target.tx.try_send(sample.clone()) {
                Ok(()) => {
                    target.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(rejected)) => {
                    target.contended.fetch_add(1, Ordering::Relaxed);
                    laggards.push((target, rejected));
                }
                Err(TrySendError::Closed(_)) => {
                    target.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if laggards.is_empty() {
            return;
        }

        // Lagging targets share one wall-clock deadline, awaited together.
        join_all(laggards.into_iter().map(|(target, rejected)| async move {
            match target.tx.send_timeout(rejected, SLOW_PATH_DEADLINE).await {
                Ok(()) => {
                    target.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    target.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(consumer = target.name, "slow path deadline expired, sample dropped");
                }
            }
        }))
        .await;
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
