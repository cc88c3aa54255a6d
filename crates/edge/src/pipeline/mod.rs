// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded fan-in buffer between the collectors and the dispatcher.
//!
//! A single FIFO queue with a hard capacity. Producers never block: when the
//! queue is full the oldest sample is evicted and counted. The sole consumer
//! is the [dispatcher](dispatch).

pub mod dispatch;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::model::TypedSample;

/// Default fan-in capacity.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Counter snapshot.
///
/// `received = written + dropped + depth` at any instant; with the queue
/// drained, `received = written + dropped`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub total_received: u64,
    pub total_written: u64,
    pub total_dropped: u64,
    pub queue_depth: usize,
}

/// Bounded drop-oldest FIFO of typed samples.
pub struct SamplePipeline {
    queue: Mutex<VecDeque<TypedSample>>,
    capacity: usize,
    notify: Notify,
    received: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl SamplePipeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            received: AtomicU64::new(0),
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking write. When full, the oldest queued sample is evicted
    /// and counted in `total_dropped`.
    pub fn push(&self, sample: TypedSample) {
        self.received.fetch_add(1, Ordering::Relaxed);
        {
            let mut queue = self.lock_queue();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(sample);
        }
        self.notify.notify_one();
    }

    /// Await the next sample. Returns `None` once cancelled and drained.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<TypedSample> {
        loop {
            if let Some(sample) = self.try_pop() {
                return Some(sample);
            }
            if cancel.is_cancelled() {
                // Drain residue that raced the cancel.
                return self.try_pop();
            }
            let notified = self.notify.notified();
            if let Some(sample) = self.try_pop() {
                return Some(sample);
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = notified => {}
            }
        }
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<TypedSample> {
        let sample = self.lock_queue().pop_front();
        if sample.is_some() {
            self.written.fetch_add(1, Ordering::Relaxed);
        }
        sample
    }

    pub fn depth(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn counters(&self) -> PipelineCounters {
        PipelineCounters {
            total_received: self.received.load(Ordering::Relaxed),
            total_written: self.written.load(Ordering::Relaxed),
            total_dropped: self.dropped.load(Ordering::Relaxed),
            queue_depth: self.depth(),
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<TypedSample>> {
        match self.queue.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
