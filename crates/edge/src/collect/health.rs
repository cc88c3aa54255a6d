// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling health for one collector loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::ReadErrorKind;
use crate::model::{epoch_ms, Protocol};

/// Latency samples kept for avg/p95.
const LATENCY_WINDOW: usize = 100;
/// Consecutive hard failures before a collector reports Disconnected.
const DISCONNECT_AFTER: u32 = 5;

/// Aggregated collector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectorState {
    Connected,
    Degraded,
    Disconnected,
}

impl CollectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Health snapshot exported for one (endpoint, scan group) loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorHealth {
    pub protocol: String,
    pub state: CollectorState,
    /// Epoch ms of the last successful batch; 0 when none yet.
    pub last_success_time: i64,
    pub consecutive_errors: u32,
    pub type_mismatch_count: u64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub active_connections: usize,
    pub total_tags: usize,
    pub healthy_tags: usize,
}

/// Mutable rolling health counters for one collector loop.
pub struct HealthTracker {
    protocol: Protocol,
    total_tags: AtomicUsize,
    healthy_tags: AtomicUsize,
    consecutive_errors: AtomicU32,
    type_mismatch_count: AtomicU64,
    last_success_ms: AtomicI64,
    last_error: Mutex<Option<String>>,
    latencies: Mutex<VecDeque<f64>>,
}

impl HealthTracker {
    pub fn new(protocol: Protocol, total_tags: usize) -> Self {
        Self {
            protocol,
            total_tags: AtomicUsize::new(total_tags),
            healthy_tags: AtomicUsize::new(0),
            consecutive_errors: AtomicU32::new(0),
            type_mismatch_count: AtomicU64::new(0),
            last_success_ms: AtomicI64::new(0),
            last_error: Mutex::new(None),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    /// Record a successful batch read.
    pub fn record_success(&self, latency_ms: f64, healthy_tags: usize) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
        self.healthy_tags.store(healthy_tags, Ordering::Relaxed);
        self.last_success_ms.store(epoch_ms(), Ordering::Relaxed);
        if let Ok(mut window) = self.latencies.lock() {
            if window.len() == LATENCY_WINDOW {
                window.pop_front();
            }
            window.push_back(latency_ms);
        }
    }

    /// Record a failed iteration.
    pub fn record_error(&self, kind: ReadErrorKind, detail: &str) {
        self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(format!("{kind}: {detail}"));
        }
    }

    pub fn record_type_mismatch(&self) {
        self.type_mismatch_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Tag count changes on reload.
    pub fn set_total_tags(&self, total: usize) {
        self.total_tags.store(total, Ordering::Relaxed);
    }

    pub fn state(&self) -> CollectorState {
        let errors = self.consecutive_errors.load(Ordering::Relaxed);
        if errors >= DISCONNECT_AFTER {
            return CollectorState::Disconnected;
        }
        if errors == 0 && self.last_success_ms.load(Ordering::Relaxed) > 0 {
            return CollectorState::Connected;
        }
        CollectorState::Degraded
    }

    pub fn snapshot(&self, active_connections: usize) -> CollectorHealth {
        let (avg, p95) = self.latency_stats();
        CollectorHealth {
            protocol: self.protocol.as_str().to_owned(),
            state: self.state(),
            last_success_time: self.last_success_ms.load(Ordering::Relaxed),
            consecutive_errors: self.consecutive_errors.load(Ordering::Relaxed),
            type_mismatch_count: self.type_mismatch_count.load(Ordering::Relaxed),
            avg_latency_ms: avg,
            p95_latency_ms: p95,
            last_error: self.last_error.lock().ok().and_then(|g| g.clone()),
            active_connections,
            total_tags: self.total_tags.load(Ordering::Relaxed),
            healthy_tags: self.healthy_tags.load(Ordering::Relaxed),
        }
    }

    fn latency_stats(&self) -> (f64, f64) {
        let Ok(window) = self.latencies.lock() else { return (0.0, 0.0) };
        if window.is_empty() {
            return (0.0, 0.0);
        }
        let avg = window.iter().sum::<f64>() / window.len() as f64;
        let mut sorted: Vec<f64> = window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
        (avg, sorted[idx.min(sorted.len() - 1)])
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
