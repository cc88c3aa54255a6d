// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-(device, tag) sliding windows of `(ts, value)` points.
//!
//! Windows are bounded both by point count and by age; the oldest entries
//! are trimmed on insert. Each key has its own lock so unrelated tags never
//! serialize. Statistics sort by `ts` at extraction time, so out-of-order
//! inserts are tolerated.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

/// Default bound on points per window.
pub const MAX_POINTS: usize = 1000;
/// Default bound on window age in milliseconds (1 hour).
pub const MAX_AGE_MS: i64 = 3_600_000;

/// Statistics over the points inside a query window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    /// Value at the smallest ts in the window.
    pub first: f64,
    /// Value at the largest ts in the window.
    pub last: f64,
    pub avg: f64,
    /// Population standard deviation.
    pub stddev: f64,
}

/// Rate-of-change metrics derived from [`WindowStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateOfChange {
    pub count: usize,
    /// `max − min` over the window.
    pub absolute_change: f64,
    /// `|absolute / first| × 100`; 0 when `first` is (near) zero.
    pub percent_change: f64,
}

struct Window {
    points: VecDeque<(i64, f64)>,
}

impl Window {
    fn insert(&mut self, ts: i64, value: f64, max_points: usize, max_age_ms: i64) {
        self.points.push_back((ts, value));
        while self.points.len() > max_points {
            self.points.pop_front();
        }
        // Age bound is measured against the newest point seen.
        let newest = self.points.iter().map(|(t, _)| *t).max().unwrap_or(ts);
        self.points.retain(|(t, _)| newest - *t <= max_age_ms);
    }

    fn stats(&self, from_ts: i64) -> Option<WindowStats> {
        let mut inside: Vec<(i64, f64)> =
            self.points.iter().copied().filter(|(t, _)| *t >= from_ts).collect();
        if inside.is_empty() {
            return None;
        }
        inside.sort_by_key(|(t, _)| *t);

        let count = inside.len();
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &(_, v) in &inside {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let avg = sum / count as f64;
        let var = inside.iter().map(|&(_, v)| (v - avg) * (v - avg)).sum::<f64>() / count as f64;

        Some(WindowStats {
            count,
            min,
            max,
            first: inside[0].1,
            last: inside[count - 1].1,
            avg,
            stddev: var.sqrt(),
        })
    }
}

type Key = (String, String);

/// Shared window set, one lock per key.
pub struct SlidingWindows {
    windows: RwLock<HashMap<Key, Arc<Mutex<Window>>>>,
    max_points: usize,
    max_age_ms: i64,
}

impl Default for SlidingWindows {
    fn default() -> Self {
        Self::new(MAX_POINTS, MAX_AGE_MS)
    }
}

impl SlidingWindows {
    pub fn new(max_points: usize, max_age_ms: i64) -> Self {
        Self { windows: RwLock::new(HashMap::new()), max_points: max_points.max(1), max_age_ms }
    }

    /// Insert one point for `(device, tag)`.
    pub fn insert(&self, device_id: &str, tag_id: &str, ts: i64, value: f64) {
        let window = self.window_for(device_id, tag_id);
        let mut w = lock(&window);
        w.insert(ts, value, self.max_points, self.max_age_ms);
    }

    /// Statistics over points with `ts ≥ now − window_ms`.
    pub fn stats(&self, device_id: &str, tag_id: &str, window_ms: i64, now: i64) -> Option<WindowStats> {
        let window = self.existing(device_id, tag_id)?;
        let w = lock(&window);
        w.stats(now - window_ms)
    }

    /// Rate-of-change metrics for the query window. `None` when the window
    /// holds fewer than two points.
    pub fn rate_of_change(
        &self,
        device_id: &str,
        tag_id: &str,
        window_ms: i64,
        now: i64,
    ) -> Option<RateOfChange> {
        let stats = self.stats(device_id, tag_id, window_ms, now)?;
        if stats.count < 2 {
            return None;
        }
        let absolute_change = stats.max - stats.min;
        let percent_change = if stats.first.abs() > 1e-9 {
            (absolute_change / stats.first).abs() * 100.0
        } else {
            0.0
        };
        Some(RateOfChange { count: stats.count, absolute_change, percent_change })
    }

    /// Current point count for a key (tests and health reporting).
    pub fn len(&self, device_id: &str, tag_id: &str) -> usize {
        self.existing(device_id, tag_id).map(|w| lock(&w).points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        match self.windows.read() {
            Ok(map) => map.is_empty(),
            Err(p) => p.into_inner().is_empty(),
        }
    }

    fn window_for(&self, device_id: &str, tag_id: &str) -> Arc<Mutex<Window>> {
        let key = (device_id.to_owned(), tag_id.to_owned());
        if let Some(w) = self.read_map().get(&key) {
            return Arc::clone(w);
        }
        let mut map = match self.windows.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        Arc::clone(
            map.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(Window { points: VecDeque::new() }))),
        )
    }

    fn existing(&self, device_id: &str, tag_id: &str) -> Option<Arc<Mutex<Window>>> {
        self.read_map().get(&(device_id.to_owned(), tag_id.to_owned())).map(Arc::clone)
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Key, Arc<Mutex<Window>>>> {
        match self.windows.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

fn lock(window: &Arc<Mutex<Window>>) -> std::sync::MutexGuard<'_, Window> {
    match window.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
