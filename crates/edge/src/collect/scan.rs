// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan loops: one independent polling loop per (endpoint, scan group).
//!
//! Each iteration acquires a pooled handle, batch-reads the group's tags,
//! maps raw values to typed samples, and try-writes them to the fan-in
//! pipeline. Every failure class has a local policy; none of them ends the
//! loop, only cancellation does.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collect::client::TagRead;
use crate::collect::health::HealthTracker;
use crate::collect::pool::ConnectionPool;
use crate::collect::typemap;
use crate::error::{PoolError, ReadErrorKind};
use crate::model::{epoch_ms, EndpointDescriptor, ScanGroup, TagDescriptor, ValueType};
use crate::pipeline::SamplePipeline;

/// One endpoint plus the scan groups polled against it.
#[derive(Debug, Clone)]
pub struct CollectorSpec {
    pub endpoint: EndpointDescriptor,
    pub groups: Vec<ScanGroup>,
}

/// Key identifying one scan loop.
pub type LoopKey = (String, String);

struct LoopEntry {
    cancel: CancellationToken,
    health: Arc<HealthTracker>,
    endpoint_id: String,
    task: tokio::task::JoinHandle<()>,
}

/// Bound on waiting for a single loop to acknowledge cancellation.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns every scan loop for one protocol client; supports start, stop,
/// and reload without ever closing the shared output pipeline.
pub struct CollectorSet {
    pool: Arc<ConnectionPool>,
    pipeline: Arc<SamplePipeline>,
    seq: Arc<AtomicU64>,
    root: CancellationToken,
    loops: tokio::sync::Mutex<HashMap<LoopKey, LoopEntry>>,
}

impl CollectorSet {
    pub fn new(
        pool: Arc<ConnectionPool>,
        pipeline: Arc<SamplePipeline>,
        seq: Arc<AtomicU64>,
        root: CancellationToken,
    ) -> Self {
        Self { pool, pipeline, seq, root, loops: tokio::sync::Mutex::new(HashMap::new()) }
    }

    /// Spawn loops for every (endpoint, group) in the specs.
    pub async fn start(&self, specs: &[CollectorSpec]) {
        let mut loops = self.loops.lock().await;
        for spec in specs {
            for group in &spec.groups {
                let key = (spec.endpoint.endpoint_id.clone(), group.name.clone());
                if loops.contains_key(&key) {
                    continue;
                }
                let cancel = self.root.child_token();
                let health = Arc::new(HealthTracker::new(
                    spec.endpoint.protocol,
                    group.tags.iter().filter(|t| t.enabled).count(),
                ));
                let task = spawn_collector(
                    Arc::clone(&self.pool),
                    Arc::clone(&self.pipeline),
                    spec.endpoint.clone(),
                    group.clone(),
                    Arc::clone(&health),
                    Arc::clone(&self.seq),
                    cancel.clone(),
                );
                loops.insert(
                    key,
                    LoopEntry {
                        cancel,
                        health,
                        endpoint_id: spec.endpoint.endpoint_id.clone(),
                        task,
                    },
                );
            }
        }
    }

    /// Stop every loop and wait for each to acknowledge, so no late sample
    /// lands after teardown. The output pipeline stays open.
    pub async fn stop(&self) {
        let entries: Vec<LoopEntry> = {
            let mut loops = self.loops.lock().await;
            loops.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.cancel.cancel();
            if tokio::time::timeout(STOP_TIMEOUT, entry.task).await.is_err() {
                tracing::warn!(endpoint = %entry.endpoint_id, "scan loop ignored cancellation");
            }
        }
    }

    /// Tear down current loops and start against the new specs, preserving
    /// the downstream queue.
    pub async fn reload(&self, specs: &[CollectorSpec]) {
        self.stop().await;
        self.start(specs).await;
        tracing::info!(loops = specs.iter().map(|s| s.groups.len()).sum::<usize>(), "collectors reloaded");
    }

    /// Health snapshot per (endpoint, group) loop.
    pub async fn health(&self) -> Vec<(LoopKey, crate::collect::health::CollectorHealth)> {
        let loops = self.loops.lock().await;
        loops
            .iter()
            .map(|(key, entry)| {
                let active = self.pool.active_connections(&entry.endpoint_id);
                (key.clone(), entry.health.snapshot(active))
            })
            .collect()
    }
}

/// Spawn one scan loop. Returns the task handle (joined only in tests).
pub fn spawn_collector(
    pool: Arc<ConnectionPool>,
    pipeline: Arc<SamplePipeline>,
    endpoint: EndpointDescriptor,
    group: ScanGroup,
    health: Arc<HealthTracker>,
    seq: Arc<AtomicU64>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_millis(group.interval_ms());
        // Tags disabled for this run after a BAD_TAG failure.
        let mut skip: HashSet<String> = HashSet::new();
        // Resolved canonical type per tag, cached after the first read.
        let mut resolved: HashMap<String, ValueType> = HashMap::new();

        tracing::debug!(
            endpoint = %endpoint.endpoint_id,
            group = %group.name,
            interval_ms = interval.as_millis() as u64,
            "scan loop started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let backoff_ms = scan_once(
                &pool, &pipeline, &endpoint, &group, &health, &seq, &mut skip, &mut resolved,
            )
            .await;

            let elapsed = started.elapsed();
            let mut delay = interval.saturating_sub(elapsed);
            // An active backoff outlasts the scan interval when longer.
            if backoff_ms > 0 {
                delay = delay.max(Duration::from_millis(backoff_ms));
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!(endpoint = %endpoint.endpoint_id, group = %group.name, "scan loop stopped");
    })
}

/// One scan iteration. Returns the backoff (ms) to apply before the next
/// iteration, 0 when none.
#[allow(clippy::too_many_arguments)]
async fn scan_once(
    pool: &ConnectionPool,
    pipeline: &SamplePipeline,
    endpoint: &EndpointDescriptor,
    group: &ScanGroup,
    health: &HealthTracker,
    seq: &AtomicU64,
    skip: &mut HashSet<String>,
    resolved: &mut HashMap<String, ValueType>,
) -> u64 {
    let tags: Vec<TagDescriptor> = group
        .tags
        .iter()
        .filter(|t| t.enabled && !skip.contains(&t.tag_id))
        .cloned()
        .collect();
    if tags.is_empty() {
        return 0;
    }

    let mut handle = match pool.acquire(endpoint).await {
        Ok(h) => h,
        Err(PoolError::Faulted { retry_in_ms, .. }) => {
            health.record_error(ReadErrorKind::NoRoute, "pool faulted");
            return retry_in_ms;
        }
        Err(PoolError::Busy { .. }) => {
            health.record_error(ReadErrorKind::TooManyConn, "pool busy");
            return 0;
        }
    };

    let mut healthy_tags = 0usize;
    let mut batch_failed = false;
    let mut backoff_ms = 0u64;
    let read_started = Instant::now();

    for chunk in tags.chunks(group.batch_size.max(1)) {
        match handle.read_batch(chunk).await {
            Ok(reads) => {
                let ts = epoch_ms();
                for read in reads {
                    if ingest_read(pipeline, endpoint, chunk, read, ts, seq, health, skip, resolved)
                    {
                        healthy_tags += 1;
                    }
                }
            }
            Err(e) => {
                let kind = e.kind();
                health.record_error(kind, &e.to_string());
                backoff_ms = crate::collect::pool::apply_failure_policy(
                    pool,
                    &endpoint.endpoint_id,
                    &e,
                );
                batch_failed = true;
                break;
            }
        }
    }

    pool.release(&endpoint.endpoint_id, handle, !batch_failed);
    if !batch_failed {
        health.record_success(read_started.elapsed().as_secs_f64() * 1000.0, healthy_tags);
    }
    backoff_ms
}

/// Map one tag read into the pipeline. Returns true when a sample was
/// produced.
#[allow(clippy::too_many_arguments)]
fn ingest_read(
    pipeline: &SamplePipeline,
    endpoint: &EndpointDescriptor,
    chunk: &[TagDescriptor],
    read: TagRead,
    ts: i64,
    seq: &AtomicU64,
    health: &HealthTracker,
    skip: &mut HashSet<String>,
    resolved: &mut HashMap<String, ValueType>,
) -> bool {
    let Some(tag) = chunk.iter().find(|t| t.tag_id == read.tag_id) else {
        tracing::debug!(tag = %read.tag_id, "read result for unknown tag");
        return false;
    };

    let (raw, quality) = match read.result {
        Ok(pair) => pair,
        Err(e) => {
            let kind = e.kind();
            if kind == ReadErrorKind::BadTag {
                // Permanently disabled for this run; a reload re-enables.
                skip.insert(tag.tag_id.clone());
                tracing::warn!(tag = %tag.tag_id, err = %e, "bad tag disabled for this run");
            }
            health.record_error(kind, &e.to_string());
            return false;
        }
    };

    let expected = match resolved.get(&tag.tag_id) {
        Some(vt) => *vt,
        None => match typemap::map_type(
            endpoint.protocol,
            &tag.device_id,
            &tag.tag_id,
            tag.declared_type.as_deref(),
            &raw,
        ) {
            Ok(vt) => {
                resolved.insert(tag.tag_id.clone(), vt);
                vt
            }
            Err(e) => {
                health.record_type_mismatch();
                tracing::debug!(err = %e, "declared type unresolvable, sample dropped");
                return false;
            }
        },
    };

    match typemap::map_value(
        &tag.device_id,
        &tag.tag_id,
        expected,
        raw,
        quality,
        endpoint.protocol,
        tag.unit.clone(),
        ts,
        seq.fetch_add(1, Ordering::Relaxed),
    ) {
        Ok(sample) => {
            pipeline.push(sample);
            true
        }
        Err(e) => {
            health.record_type_mismatch();
            tracing::debug!(err = %e, "type mismatch, sample dropped");
            false
        }
    }
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
