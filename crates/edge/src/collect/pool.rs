// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-endpoint connection pool.
//!
//! One pool serves every endpoint of one protocol. Each endpoint keeps a
//! small set of idle handles, a family-clamped concurrency limit, and a
//! stepped backoff window that gates `acquire` after faults. An idle-reap
//! task drops endpoints that have gone unused.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collect::client::{ProtocolClient, ProtocolHandle};
use crate::error::{PoolError, ProtocolError};
use crate::events::{EdgeEvent, EventHub};
use crate::model::EndpointDescriptor;

/// Backoff schedule applied on consecutive faults, capped at the last step.
const BACKOFF_STEPS: [Duration; 7] = [
    Duration::from_secs(0),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

/// Endpoints unused for this long are reaped.
const IDLE_TTL: Duration = Duration::from_secs(300);
/// Reap sweep interval.
const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Endpoint condition as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointCondition {
    Connected,
    Degraded,
    Faulted,
}

impl EndpointCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Faulted => "faulted",
        }
    }
}

struct EndpointSlot {
    idle: Vec<Box<dyn ProtocolHandle>>,
    in_use: usize,
    limit: usize,
    condition: EndpointCondition,
    backoff_step: usize,
    faulted_until: Option<Instant>,
    last_used: Instant,
}

impl EndpointSlot {
    fn new(limit: usize) -> Self {
        Self {
            idle: Vec::new(),
            in_use: 0,
            limit,
            condition: EndpointCondition::Connected,
            backoff_step: 0,
            faulted_until: None,
            last_used: Instant::now(),
        }
    }
}

/// Pooled handles for a set of endpoints sharing one protocol client.
///
/// Slots live in an `IndexMap` touched to the back on acquisition, so
/// iteration sees least-recently-used endpoints first. Condition
/// transitions are published to the event hub when one is attached.
pub struct ConnectionPool {
    client: Arc<dyn ProtocolClient>,
    slots: Mutex<IndexMap<String, EndpointSlot>>,
    events: Option<Arc<EventHub>>,
}

impl ConnectionPool {
    pub fn new(client: Arc<dyn ProtocolClient>, events: Option<Arc<EventHub>>) -> Arc<Self> {
        Arc::new(Self { client, slots: Mutex::new(IndexMap::new()), events })
    }

    /// Acquire a handle for the endpoint, connecting if no idle handle is
    /// available.
    ///
    /// Fails fast with [`PoolError::Faulted`] inside a backoff window and
    /// with [`PoolError::Busy`] at the family-clamped handle limit; neither
    /// blocks.
    pub async fn acquire(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Box<dyn ProtocolHandle>, PoolError> {
        let reused = {
            let mut slots = self.lock_slots();
            // Touch-to-back: remove and reinsert so the slot moves to the
            // most-recently-used end.
            let mut slot = slots
                .shift_remove(&endpoint.endpoint_id)
                .unwrap_or_else(|| EndpointSlot::new(endpoint.connection_limit()));
            slot.last_used = Instant::now();

            if let Some(until) = slot.faulted_until {
                let now = Instant::now();
                if now < until {
                    let retry_in_ms = (until - now).as_millis() as u64;
                    slots.insert(endpoint.endpoint_id.clone(), slot);
                    return Err(PoolError::Faulted {
                        endpoint_id: endpoint.endpoint_id.clone(),
                        retry_in_ms,
                    });
                }
            }

            if slot.in_use >= slot.limit {
                let limit = slot.limit;
                slots.insert(endpoint.endpoint_id.clone(), slot);
                return Err(PoolError::Busy {
                    endpoint_id: endpoint.endpoint_id.clone(),
                    limit,
                });
            }

            // Reserve the concurrency slot before any await so the clamp
            // holds across concurrent acquirers.
            slot.in_use += 1;
            let handle = slot.idle.pop();
            slots.insert(endpoint.endpoint_id.clone(), slot);
            handle
        };

        if let Some(handle) = reused {
            if handle.is_alive() {
                self.note_success(&endpoint.endpoint_id);
                return Ok(handle);
            }
            // Dead idle handle: fall through to a fresh connect.
        }

        match self.client.connect(endpoint).await {
            Ok(handle) => {
                self.note_success(&endpoint.endpoint_id);
                Ok(handle)
            }
            Err(e) => {
                self.unreserve(&endpoint.endpoint_id);
                let retry_in_ms = if e.kind().faults_endpoint() {
                    self.mark_faulted(&endpoint.endpoint_id, &e.to_string())
                } else {
                    self.mark_degraded(&endpoint.endpoint_id, &e.to_string());
                    0
                };
                Err(PoolError::Faulted { endpoint_id: endpoint.endpoint_id.clone(), retry_in_ms })
            }
        }
    }

    /// Return a handle to the pool. Unhealthy handles are discarded.
    pub fn release(&self, endpoint_id: &str, handle: Box<dyn ProtocolHandle>, healthy: bool) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(endpoint_id) {
            slot.in_use = slot.in_use.saturating_sub(1);
            slot.last_used = Instant::now();
            if healthy && handle.is_alive() {
                slot.idle.push(handle);
            }
        }
    }

    /// Fault the endpoint and advance its backoff. Returns the backoff
    /// window that now gates `acquire`, in milliseconds.
    pub fn mark_faulted(&self, endpoint_id: &str, reason: &str) -> u64 {
        let (delay, changed) = {
            let mut slots = self.lock_slots();
            let Some(slot) = slots.get_mut(endpoint_id) else { return 0 };
            let delay = BACKOFF_STEPS[slot.backoff_step.min(BACKOFF_STEPS.len() - 1)];
            slot.backoff_step = (slot.backoff_step + 1).min(BACKOFF_STEPS.len() - 1);
            slot.faulted_until = Some(Instant::now() + delay);
            let changed = slot.condition != EndpointCondition::Faulted;
            slot.condition = EndpointCondition::Faulted;
            slot.idle.clear();
            (delay, changed)
        };
        tracing::warn!(endpoint = %endpoint_id, backoff_ms = delay.as_millis() as u64, reason, "endpoint faulted");
        if changed {
            self.publish_condition(endpoint_id, EndpointCondition::Faulted);
        }
        delay.as_millis() as u64
    }

    /// Note a soft failure (timeout) without entering backoff.
    pub fn mark_degraded(&self, endpoint_id: &str, reason: &str) {
        let changed = {
            let mut slots = self.lock_slots();
            let Some(slot) = slots.get_mut(endpoint_id) else { return };
            let changed = slot.condition != EndpointCondition::Degraded;
            slot.condition = EndpointCondition::Degraded;
            changed
        };
        tracing::debug!(endpoint = %endpoint_id, reason, "endpoint degraded");
        if changed {
            self.publish_condition(endpoint_id, EndpointCondition::Degraded);
        }
    }

    /// Condition of an endpoint, if the pool has seen it.
    pub fn condition(&self, endpoint_id: &str) -> Option<EndpointCondition> {
        self.lock_slots().get(endpoint_id).map(|s| s.condition)
    }

    /// Handles currently out of the pool for an endpoint.
    pub fn active_connections(&self, endpoint_id: &str) -> usize {
        self.lock_slots().get(endpoint_id).map(|s| s.in_use).unwrap_or(0)
    }

    /// Drop endpoints unused for longer than [`IDLE_TTL`]. Endpoints with
    /// handles still out stay.
    pub fn reap(&self) -> usize {
        let mut slots = self.lock_slots();
        let before = slots.len();
        slots.retain(|_, slot| slot.in_use > 0 || slot.last_used.elapsed() < IDLE_TTL);
        before - slots.len()
    }

    fn note_success(&self, endpoint_id: &str) {
        let changed = {
            let mut slots = self.lock_slots();
            let Some(slot) = slots.get_mut(endpoint_id) else { return };
            slot.backoff_step = 0;
            slot.faulted_until = None;
            let changed = slot.condition != EndpointCondition::Connected;
            slot.condition = EndpointCondition::Connected;
            changed
        };
        if changed {
            self.publish_condition(endpoint_id, EndpointCondition::Connected);
        }
    }

    fn publish_condition(&self, endpoint_id: &str, condition: EndpointCondition) {
        if let Some(events) = &self.events {
            events.publish(EdgeEvent::EndpointStateChanged {
                endpoint_id: endpoint_id.to_owned(),
                state: condition.as_str().to_owned(),
            });
        }
    }

    fn unreserve(&self, endpoint_id: &str) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(endpoint_id) {
            slot.in_use = slot.in_use.saturating_sub(1);
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, IndexMap<String, EndpointSlot>> {
        match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Spawn the idle-reap task for a pool.
pub fn spawn_reaper(pool: Arc<ConnectionPool>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(REAP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            let reaped = pool.reap();
            if reaped > 0 {
                tracing::debug!(reaped, "reaped idle endpoints");
            }
        }
    });
}

/// Helper for collectors: classify a protocol failure, mark the endpoint,
/// and return the backoff to apply (ms) when the fault gates the loop.
pub fn apply_failure_policy(
    pool: &ConnectionPool,
    endpoint_id: &str,
    err: &ProtocolError,
) -> u64 {
    if err.kind().faults_endpoint() {
        pool.mark_faulted(endpoint_id, &err.to_string())
    } else {
        pool.mark_degraded(endpoint_id, &err.to_string());
        0
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
