// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batched time-series writer.
//!
//! Single consumer of the writer dispatch target. Accumulates until
//! `batch_size` or `flush_ms`, appends through the repository, retries with
//! exponential backoff, and hands exhausted batches to the overflow sink;
//! an accepted sample is never dropped silently. The shutdown drain ignores
//! cancellation so in-flight samples are persisted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::model::TypedSample;
use crate::persist::overflow::OverflowSink;
use crate::store::TelemetryRepository;

/// Write-duration samples kept for the p95 window.
const DURATION_WINDOW: usize = 100;
/// Backoff cap between retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Carryover bound for batches the overflow sink itself refused.
const MAX_CARRYOVER: usize = 10_000;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub flush_ms: u64,
    pub max_retries: u32,
    /// First retry delay; doubles per attempt up to the cap.
    pub initial_retry_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self { batch_size: 500, flush_ms: 1_000, max_retries: 5, initial_retry_ms: 500 }
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WriterMetrics {
    pub written_total: u64,
    pub batches: u64,
    pub retries: u64,
    pub overflowed: u64,
    pub last_write_ms: i64,
    pub p95_ms: f64,
}

pub struct BatchWriter {
    repo: Arc<dyn TelemetryRepository>,
    overflow: Arc<OverflowSink>,
    config: WriterConfig,
    written_total: AtomicU64,
    batches: AtomicU64,
    retries: AtomicU64,
    overflowed: AtomicU64,
    last_write_ms: AtomicI64,
    durations: Mutex<VecDeque<f64>>,
    /// Batches the overflow sink refused, retried on the next overflow.
    carryover: Mutex<VecDeque<TypedSample>>,
}

impl BatchWriter {
    pub fn new(
        repo: Arc<dyn TelemetryRepository>,
        overflow: Arc<OverflowSink>,
        config: WriterConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            overflow,
            config,
            written_total: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
            last_write_ms: AtomicI64::new(0),
            durations: Mutex::new(VecDeque::with_capacity(DURATION_WINDOW)),
            carryover: Mutex::new(VecDeque::new()),
        })
    }

    pub fn metrics(&self) -> WriterMetrics {
        let p95 = {
            let window = match self.durations.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            if window.is_empty() {
                0.0
            } else {
                let mut sorted: Vec<f64> = window.iter().copied().collect();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let idx = ((sorted.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
                sorted[idx.min(sorted.len() - 1)]
            }
        };
        WriterMetrics {
            written_total: self.written_total.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            last_write_ms: self.last_write_ms.load(Ordering::Relaxed),
            p95_ms: p95,
        }
    }

    /// Writer loop. On cancellation, drains the channel and writes the
    /// residue with retries that no longer honor the cancel token.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<TypedSample>, cancel: CancellationToken) {
        loop {
            let (batch, cancelled) = self.collect_batch(&mut rx, &cancel).await;
            if !batch.is_empty() {
                // A batch caught by cancellation already belongs to the
                // uncancellable drain.
                let cancel = if cancelled { None } else { Some(&cancel) };
                self.write_batch(batch, cancel).await;
            }
            if cancelled {
                break;
            }
        }

        // Uncancellable final drain: keep reading until the queue goes
        // quiet, so residue the dispatcher is still flushing is caught.
        let mut residue = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(sample)) => {
                    residue.push(sample);
                    if residue.len() >= self.config.batch_size {
                        self.write_batch(std::mem::take(&mut residue), None).await;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        if !residue.is_empty() {
            self.write_batch(residue, None).await;
        }
        tracing::debug!("batch writer stopped");
    }

    /// Accumulate until `batch_size`, `flush_ms`, or cancellation. Returns
    /// the batch and whether the loop should stop.
    async fn collect_batch(
        &self,
        rx: &mut mpsc::Receiver<TypedSample>,
        cancel: &CancellationToken,
    ) -> (Vec<TypedSample>, bool) {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        let deadline = Instant::now() + Duration::from_millis(self.config.flush_ms);

        while batch.len() < self.config.batch_size {
            tokio::select! {
                _ = cancel.cancelled() => return (batch, true),
                _ = tokio::time::sleep_until(deadline) => break,
                sample = rx.recv() => match sample {
                    Some(sample) => batch.push(sample),
                    None => return (batch, true),
                }
            }
        }
        (batch, false)
    }

    /// Append with retry/backoff; exhausted batches go to the overflow
    /// sink. `cancel: None` runs uncancellable (shutdown drain).
    async fn write_batch(&self, batch: Vec<TypedSample>, cancel: Option<&CancellationToken>) {
        let size = batch.len() as u64;
        let mut delay = Duration::from_millis(self.config.initial_retry_ms.max(1));
        let started = Instant::now();

        for attempt in 0..=self.config.max_retries {
            match self.repo.append_batch(&batch).await {
                Ok(written) => {
                    self.written_total.fetch_add(written as u64, Ordering::Relaxed);
                    self.batches.fetch_add(1, Ordering::Relaxed);
                    self.last_write_ms.store(crate::model::epoch_ms(), Ordering::Relaxed);
                    self.note_duration(started.elapsed().as_secs_f64() * 1000.0);
                    return;
                }
                Err(e) => {
                    if attempt == self.config.max_retries {
                        tracing::error!(err = %e, size, "append exhausted retries, overflowing");
                        break;
                    }
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(err = %e, attempt, delay_ms = delay.as_millis() as u64, "append failed, retrying");
                    match cancel {
                        Some(cancel) => {
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    // Shutting down: stop retrying, overflow now.
                                    break;
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }

        self.send_to_overflow(batch).await;
    }

    async fn send_to_overflow(&self, batch: Vec<TypedSample>) {
        // Include anything a previous overflow failure left behind.
        let mut payload = {
            let mut carry = match self.carryover.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            carry.drain(..).collect::<Vec<_>>()
        };
        payload.extend(batch);

        match self.overflow.append(&payload).await {
            Ok(()) => {
                self.overflowed.fetch_add(payload.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(err = %e, size = payload.len(), "overflow sink failed, retaining batch");
                let mut carry = match self.carryover.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                for sample in payload {
                    if carry.len() >= MAX_CARRYOVER {
                        carry.pop_front();
                    }
                    carry.push_back(sample);
                }
            }
        }
    }

    fn note_duration(&self, ms: f64) {
        let mut window = match self.durations.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if window.len() == DURATION_WINDOW {
            window.pop_front();
        }
        window.push_back(ms);
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
