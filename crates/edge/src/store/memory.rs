// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store implementations for tests and simulation runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::{epoch_ms, AlarmRecord, AlarmRule, AlarmStatus, TypedSample};
use crate::store::{
    AlarmFilter, AlarmRuleRepository, AlarmStore, LastSeenStore, Paging, TelemetryFilter,
    TelemetryRepository,
};

/// Vec-backed telemetry repository with a failure toggle for writer tests.
#[derive(Default)]
pub struct MemoryTelemetryStore {
    points: RwLock<Vec<TypedSample>>,
    fail_appends: AtomicBool,
    append_attempts: AtomicUsize,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `append_batch` fail (writer retry tests).
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }
}

#[async_trait]
impl TelemetryRepository for MemoryTelemetryStore {
    async fn append_batch(&self, points: &[TypedSample]) -> Result<usize, StoreError> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected append failure".to_owned()));
        }
        let mut store = self.points.write().await;
        store.extend_from_slice(points);
        Ok(points.len())
    }

    async fn latest(
        &self,
        device_id: &str,
        tag_id: &str,
    ) -> Result<Option<TypedSample>, StoreError> {
        let store = self.points.read().await;
        Ok(store
            .iter()
            .filter(|p| p.device_id == device_id && p.tag_id == tag_id)
            .max_by_key(|p| (p.ts, p.seq))
            .cloned())
    }

    async fn query(
        &self,
        filter: &TelemetryFilter,
        paging: Paging,
    ) -> Result<Vec<TypedSample>, StoreError> {
        let store = self.points.read().await;
        Ok(store
            .iter()
            .filter(|p| {
                filter.device_id.as_deref().is_none_or(|d| p.device_id == d)
                    && filter.tag_id.as_deref().is_none_or(|t| p.tag_id == t)
                    && filter.from_ts.is_none_or(|from| p.ts >= from)
                    && filter.to_ts.is_none_or(|to| p.ts < to)
            })
            .skip(paging.offset)
            .take(paging.limit)
            .cloned()
            .collect())
    }
}

/// Map-backed alarm store enforcing the open-code uniqueness contract.
#[derive(Default)]
pub struct MemoryAlarmStore {
    alarms: RwLock<HashMap<String, AlarmRecord>>,
}

impl MemoryAlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<AlarmRecord> {
        self.alarms.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl AlarmStore for MemoryAlarmStore {
    async fn create(&self, alarm: AlarmRecord) -> Result<(), StoreError> {
        let mut alarms = self.alarms.write().await;
        // The uniqueness check runs under the same write lock as the
        // insert, mirroring a partial unique index on open codes.
        if alarms.values().any(|a| a.code == alarm.code && a.status.is_active()) {
            return Err(StoreError::OpenAlarmExists(alarm.code));
        }
        alarms.insert(alarm.alarm_id.clone(), alarm);
        Ok(())
    }

    async fn get(&self, alarm_id: &str) -> Result<AlarmRecord, StoreError> {
        self.alarms
            .read()
            .await
            .get(alarm_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(alarm_id.to_owned()))
    }

    async fn query(
        &self,
        filter: &AlarmFilter,
        paging: Paging,
    ) -> Result<Vec<AlarmRecord>, StoreError> {
        let alarms = self.alarms.read().await;
        let mut hits: Vec<AlarmRecord> = alarms
            .values()
            .filter(|a| {
                filter.device_id.as_deref().is_none_or(|d| a.device_id == d)
                    && filter.code.as_deref().is_none_or(|c| a.code == c)
                    && (!filter.open_only || a.status.is_active())
            })
            .cloned()
            .collect();
        hits.sort_by_key(|a| (a.ts, a.alarm_id.clone()));
        Ok(hits.into_iter().skip(paging.offset).take(paging.limit).collect())
    }

    async fn ack(&self, alarm_id: &str, user: &str, note: Option<&str>) -> Result<(), StoreError> {
        let mut alarms = self.alarms.write().await;
        let alarm = alarms
            .get_mut(alarm_id)
            .ok_or_else(|| StoreError::NotFound(alarm_id.to_owned()))?;
        if alarm.status != AlarmStatus::Open {
            return Err(StoreError::Invalid(format!(
                "cannot ack alarm in status {:?}",
                alarm.status
            )));
        }
        alarm.status = AlarmStatus::Acknowledged;
        alarm.ack_user = Some(user.to_owned());
        alarm.ack_note = note.map(str::to_owned);
        alarm.updated_utc = epoch_ms();
        Ok(())
    }

    async fn close(&self, alarm_id: &str) -> Result<(), StoreError> {
        let mut alarms = self.alarms.write().await;
        let alarm = alarms
            .get_mut(alarm_id)
            .ok_or_else(|| StoreError::NotFound(alarm_id.to_owned()))?;
        if alarm.status == AlarmStatus::Closed {
            return Err(StoreError::Invalid("alarm already closed".to_owned()));
        }
        alarm.status = AlarmStatus::Closed;
        alarm.updated_utc = epoch_ms();
        Ok(())
    }

    async fn has_open_by_code(&self, code: &str) -> Result<bool, StoreError> {
        let alarms = self.alarms.read().await;
        Ok(alarms.values().any(|a| a.code == code && a.status.is_active()))
    }

    async fn set_group(&self, alarm_id: &str, group_id: &str) -> Result<(), StoreError> {
        let mut alarms = self.alarms.write().await;
        let alarm = alarms
            .get_mut(alarm_id)
            .ok_or_else(|| StoreError::NotFound(alarm_id.to_owned()))?;
        alarm.group_id = Some(group_id.to_owned());
        alarm.updated_utc = epoch_ms();
        Ok(())
    }
}

/// Static rule repository; `replace` emulates external rule edits.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<AlarmRule>>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<AlarmRule>) -> Self {
        Self { rules: RwLock::new(rules) }
    }

    pub async fn replace(&self, rules: Vec<AlarmRule>) {
        *self.rules.write().await = rules;
    }
}

#[async_trait]
impl AlarmRuleRepository for MemoryRuleStore {
    async fn list_enabled(&self) -> Result<Vec<AlarmRule>, StoreError> {
        Ok(self.rules.read().await.iter().filter(|r| r.enabled).cloned().collect())
    }
}

/// Map-backed last-seen sink with a failure toggle for flush tests.
#[derive(Default)]
pub struct MemoryLastSeenStore {
    entries: RwLock<HashMap<(String, String), i64>>,
    fail_upserts: AtomicBool,
}

impl MemoryLastSeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub async fn get(&self, device_id: &str, tag_id: &str) -> Option<i64> {
        self.entries
            .read()
            .await
            .get(&(device_id.to_owned(), tag_id.to_owned()))
            .copied()
    }
}

#[async_trait]
impl LastSeenStore for MemoryLastSeenStore {
    async fn upsert_batch(&self, entries: &[(String, String, i64)]) -> Result<(), StoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected upsert failure".to_owned()));
        }
        let mut store = self.entries.write().await;
        for (device_id, tag_id, ts) in entries {
            let entry = store.entry((device_id.clone(), tag_id.clone())).or_insert(*ts);
            *entry = (*entry).max(*ts);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
