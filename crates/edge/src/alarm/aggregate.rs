// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alarm aggregation: correlated alarms roll into one group per
//! `(device_id, extracted rule id)`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::alarm::extract_rule_id;
use crate::model::{AlarmGroup, AlarmRecord, AlarmStatus};

type Key = (String, String);

/// Groups alarms by `(device, rule)`. Ack/close operate on the group's
/// aggregate status only; member records are driven by the caller.
#[derive(Default)]
pub struct AlarmAggregator {
    groups: Mutex<HashMap<Key, AlarmGroup>>,
}

impl AlarmAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an alarm into its group, creating the group when no active one
    /// exists. Returns the updated group.
    pub fn aggregate(&self, alarm: &AlarmRecord) -> AlarmGroup {
        let rule_id = extract_rule_id(&alarm.code);
        let key = (alarm.device_id.clone(), rule_id.clone());
        let mut groups = self.lock_groups();

        match groups.get_mut(&key).filter(|g| g.aggregate_status != AlarmStatus::Closed) {
            Some(group) => {
                group.alarm_count += 1;
                group.last_occurred_utc = alarm.ts;
                group.severity = group.severity.max(alarm.severity);
                group.message = alarm.message.clone();
                group.clone()
            }
            None => {
                let group = AlarmGroup {
                    group_id: format!("grp-{}-{}-{}", alarm.device_id, rule_id, alarm.ts),
                    device_id: alarm.device_id.clone(),
                    rule_id,
                    severity: alarm.severity,
                    alarm_count: 1,
                    first_occurred_utc: alarm.ts,
                    last_occurred_utc: alarm.ts,
                    aggregate_status: AlarmStatus::Open,
                    message: alarm.message.clone(),
                };
                groups.insert(key, group.clone());
                group
            }
        }
    }

    /// Mark a group acknowledged. No effect on member records.
    pub fn ack_group(&self, group_id: &str) -> Option<AlarmGroup> {
        self.update_status(group_id, AlarmStatus::Acknowledged)
    }

    /// Close a group; the next alarm for the same key starts a new group.
    pub fn close_group(&self, group_id: &str) -> Option<AlarmGroup> {
        self.update_status(group_id, AlarmStatus::Closed)
    }

    pub fn get(&self, group_id: &str) -> Option<AlarmGroup> {
        self.lock_groups().values().find(|g| g.group_id == group_id).cloned()
    }

    /// All non-Closed groups.
    pub fn active_groups(&self) -> Vec<AlarmGroup> {
        self.lock_groups()
            .values()
            .filter(|g| g.aggregate_status != AlarmStatus::Closed)
            .cloned()
            .collect()
    }

    fn update_status(&self, group_id: &str, status: AlarmStatus) -> Option<AlarmGroup> {
        let mut groups = self.lock_groups();
        let group = groups.values_mut().find(|g| g.group_id == group_id)?;
        // Status only moves forward.
        if status <= group.aggregate_status {
            return None;
        }
        group.aggregate_status = status;
        Some(group.clone())
    }

    fn lock_groups(&self) -> std::sync::MutexGuard<'_, HashMap<Key, AlarmGroup>> {
        match self.groups.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
