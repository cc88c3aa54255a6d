// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence boundaries.
//!
//! The core depends only on these traits. Engine choice, partitioning,
//! compression, and retention live behind them; the bundled
//! [`memory`] implementations back tests and simulation runs.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{AlarmRecord, AlarmRule, TypedSample};

/// Page request for store queries.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Self { offset: 0, limit: 500 }
    }
}

/// Telemetry query filter; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TelemetryFilter {
    pub device_id: Option<String>,
    pub tag_id: Option<String>,
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
}

/// Alarm query filter.
#[derive(Debug, Clone, Default)]
pub struct AlarmFilter {
    pub device_id: Option<String>,
    pub code: Option<String>,
    pub open_only: bool,
}

/// Time-series sink keyed `(device_id, tag_id, ts, seq)`.
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Append a batch; returns the number of points written.
    async fn append_batch(&self, points: &[TypedSample]) -> Result<usize, StoreError>;

    async fn latest(&self, device_id: &str, tag_id: &str)
        -> Result<Option<TypedSample>, StoreError>;

    async fn query(
        &self,
        filter: &TelemetryFilter,
        paging: Paging,
    ) -> Result<Vec<TypedSample>, StoreError>;
}

/// Alarm persistence.
///
/// `create` must enforce at most one non-Closed record per `code`,
/// returning [`StoreError::OpenAlarmExists`] otherwise; callers treat that
/// as "already open" and suppress.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    async fn create(&self, alarm: AlarmRecord) -> Result<(), StoreError>;

    async fn get(&self, alarm_id: &str) -> Result<AlarmRecord, StoreError>;

    async fn query(
        &self,
        filter: &AlarmFilter,
        paging: Paging,
    ) -> Result<Vec<AlarmRecord>, StoreError>;

    /// Acknowledge; legal only from Open.
    async fn ack(&self, alarm_id: &str, user: &str, note: Option<&str>) -> Result<(), StoreError>;

    /// Close; legal from Open or Acknowledged.
    async fn close(&self, alarm_id: &str) -> Result<(), StoreError>;

    /// Whether an Open/Acknowledged alarm exists for the code.
    async fn has_open_by_code(&self, code: &str) -> Result<bool, StoreError>;

    /// Link an alarm to an aggregation group.
    async fn set_group(&self, alarm_id: &str, group_id: &str) -> Result<(), StoreError>;
}

/// Source of enabled alarm rules; refreshed by the registry.
#[async_trait]
pub trait AlarmRuleRepository: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<AlarmRule>, StoreError>;
}

/// Durable sink for the last-data tracker's periodic flush.
#[async_trait]
pub trait LastSeenStore: Send + Sync {
    /// Batched upsert of `(device_id, tag_id) → max ts`.
    async fn upsert_batch(&self, entries: &[(String, String, i64)]) -> Result<(), StoreError>;
}
