// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Most-recent timestamp per (device, tag), feeding offline detection.
//!
//! Updates max-merge concurrently from the dispatcher; a pending map
//! accumulates changes and is flushed to the durable store on an interval.
//! A failed flush re-enqueues its batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::TypedSample;
use crate::store::LastSeenStore;

/// Default flush cadence.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

type Key = (String, String);

#[derive(Default)]
pub struct LastDataTracker {
    live: Mutex<HashMap<Key, i64>>,
    pending: Mutex<HashMap<Key, i64>>,
}

impl LastDataTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record an observation; both maps keep the max timestamp.
    pub fn note(&self, device_id: &str, tag_id: &str, ts: i64) {
        let key = (device_id.to_owned(), tag_id.to_owned());
        merge_max(&self.live, key.clone(), ts);
        merge_max(&self.pending, key, ts);
    }

    pub fn get(&self, device_id: &str, tag_id: &str) -> Option<i64> {
        lock(&self.live).get(&(device_id.to_owned(), tag_id.to_owned())).copied()
    }

    /// All devices that have reported a tag, with their last timestamps.
    pub fn entries_for_tag(&self, tag_id: &str) -> Vec<(String, i64)> {
        lock(&self.live)
            .iter()
            .filter(|((_, t), _)| t == tag_id)
            .map(|((d, _), ts)| (d.clone(), *ts))
            .collect()
    }

    /// Drain the pending map for a flush.
    pub fn take_pending(&self) -> Vec<(String, String, i64)> {
        lock(&self.pending)
            .drain()
            .map(|((d, t), ts)| (d, t, ts))
            .collect()
    }

    /// Put a failed flush back; newer observations win the merge.
    pub fn restore_pending(&self, batch: Vec<(String, String, i64)>) {
        for (d, t, ts) in batch {
            merge_max(&self.pending, (d, t), ts);
        }
    }
}

fn merge_max(map: &Mutex<HashMap<Key, i64>>, key: Key, ts: i64) {
    let mut m = lock(map);
    let entry = m.entry(key).or_insert(ts);
    *entry = (*entry).max(ts);
}

fn lock(m: &Mutex<HashMap<Key, i64>>) -> std::sync::MutexGuard<'_, HashMap<Key, i64>> {
    match m.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

/// Consume the dispatcher target, noting every sample.
pub async fn run_consumer(
    tracker: Arc<LastDataTracker>,
    mut rx: mpsc::Receiver<TypedSample>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            sample = rx.recv() => match sample {
                Some(s) => tracker.note(&s.device_id, &s.tag_id, s.ts),
                None => break,
            }
        }
    }
    tracing::debug!("last-data consumer stopped");
}

/// Spawn the periodic flusher. One final flush runs on shutdown.
pub fn spawn_flusher(
    tracker: Arc<LastDataTracker>,
    store: Arc<dyn LastSeenStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            flush(&tracker, store.as_ref()).await;
        }
        flush(&tracker, store.as_ref()).await;
        tracing::debug!("last-data flusher stopped");
    });
}

async fn flush(tracker: &LastDataTracker, store: &dyn LastSeenStore) {
    let batch = tracker.take_pending();
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    if let Err(e) = store.upsert_batch(&batch).await {
        tracing::warn!(err = %e, count, "last-seen flush failed, re-enqueueing");
        tracker.restore_pending(batch);
    } else {
        tracing::trace!(count, "last-seen flushed");
    }
}

#[cfg(test)]
#[path = "lastdata_tests.rs"]
mod tests;
