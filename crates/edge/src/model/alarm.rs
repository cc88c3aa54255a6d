// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alarm records, groups, and the intents the evaluators emit.

use serde::{Deserialize, Serialize};

/// Alarm lifecycle; transitions are monotonic Open → Acknowledged → Closed
/// (Acknowledged may be skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlarmStatus {
    Open = 0,
    Acknowledged = 1,
    Closed = 2,
}

impl AlarmStatus {
    /// Open and Acknowledged alarms count against the per-code dedup.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// A persisted alarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub alarm_id: String,
    pub device_id: String,
    pub tag_id: String,
    /// Sample timestamp that triggered the alarm, epoch ms.
    pub ts: i64,
    pub severity: u8,
    /// `RULE:<ruleId>` or `OFFLINE:<ruleId>` by convention.
    pub code: String,
    pub message: String,
    pub status: AlarmStatus,
    pub created_utc: i64,
    pub updated_utc: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_note: Option<String>,
}

/// A set of correlated alarms sharing `(device_id, extracted rule id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmGroup {
    pub group_id: String,
    pub device_id: String,
    pub rule_id: String,
    /// Rolling max of member severities.
    pub severity: u8,
    pub alarm_count: u64,
    pub first_occurred_utc: i64,
    pub last_occurred_utc: i64,
    pub aggregate_status: AlarmStatus,
    /// Message of the most recent member.
    pub message: String,
}

/// An alarm the evaluators want created, before dedup at the store.
#[derive(Debug, Clone)]
pub struct AlarmIntent {
    pub device_id: String,
    pub tag_id: String,
    /// Timestamp of the sample (or sweep) that triggered the intent.
    pub ts: i64,
    pub severity: u8,
    pub code: String,
    pub message: String,
}

/// Extract the rule id from an alarm code: the suffix after the first `:`
/// when present, the whole code otherwise. Characters outside
/// `[A-Za-z0-9_-]` are sanitized to `_`.
pub fn extract_rule_id(code: &str) -> String {
    let raw = match code.split_once(':') {
        Some((_, suffix)) => suffix,
        None => code,
    };
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "alarm_tests.rs"]
mod tests;
