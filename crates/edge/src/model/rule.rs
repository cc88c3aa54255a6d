// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alarm rule definitions.
//!
//! Rules arrive from the rule repository with a free-form `condition_type`
//! string; the registry loader is the only place that inspects it, stamping
//! the [`RuleFamily`] and parsed [`ConditionOp`] on the cached rule.

use serde::{Deserialize, Serialize};

/// Rule family, stamped at registry load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    Threshold,
    Offline,
    Roc,
    Volatility,
}

/// Comparison operators for threshold conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

/// Tolerance for `eq`/`ne` comparisons.
pub const EQ_TOLERANCE: f64 = 1e-9;

impl ConditionOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            _ => None,
        }
    }

    /// Evaluate `value <op> threshold`.
    pub fn eval(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => (value - threshold).abs() <= EQ_TOLERANCE,
            Self::Ne => (value - threshold).abs() > EQ_TOLERANCE,
        }
    }
}

/// Rate-of-change metric selected by a RoC rule's condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RocMetric {
    Absolute,
    Percent,
}

/// An enabled alarm rule as published by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRule {
    pub rule_id: String,
    pub name: String,
    /// When set, the rule only matches samples from this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub tag_id: String,
    pub family: RuleFamily,
    /// Parsed operator; `None` for families that do not compare
    /// (Offline, Volatility) or when the stored string was unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<ConditionOp>,
    /// RoC metric; only meaningful for `family = Roc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc_metric: Option<RocMetric>,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_high: Option<f64>,
    /// 1 (lowest) ..= 5 (highest).
    pub severity: u8,
    pub enabled: bool,
    /// Minimum spacing between emissions for this rule.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: i64,
    /// How long the condition must hold before firing.
    #[serde(default)]
    pub duration_ms: i64,
    /// Sliding-window span for RoC / volatility rules.
    #[serde(default = "default_roc_window_ms")]
    pub roc_window_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
}

fn default_debounce_ms() -> i64 {
    5_000
}

fn default_roc_window_ms() -> i64 {
    60_000
}

impl AlarmRule {
    /// Alarm code for records emitted by this rule.
    pub fn code(&self) -> String {
        match self.family {
            RuleFamily::Offline => format!("OFFLINE:{}", self.rule_id),
            _ => format!("RULE:{}", self.rule_id),
        }
    }

    /// Whether the rule applies to a given (device, tag) pair.
    pub fn matches(&self, device_id: &str, tag_id: &str) -> bool {
        if self.tag_id != tag_id {
            return false;
        }
        match &self.device_id {
            Some(d) => d == device_id,
            None => true,
        }
    }

    /// Offline timeout in milliseconds.
    ///
    /// Offline rule thresholds are authored in seconds; the conversion
    /// happens here, once, rather than at every sweep.
    pub fn offline_timeout_ms(&self) -> i64 {
        (self.threshold * 1000.0) as i64
    }

    /// Render the alarm message, substituting `{value}`, `{threshold}`,
    /// `{tag}`, and `{device}` in the template when one is set.
    pub fn render_message(&self, device_id: &str, tag_id: &str, value: f64) -> String {
        match &self.message_template {
            Some(t) => t
                .replace("{value}", &format!("{value:.4}"))
                .replace("{threshold}", &format!("{:.4}", self.threshold))
                .replace("{tag}", tag_id)
                .replace("{device}", device_id),
            None => format!(
                "{}: {tag_id}={value:.4} (threshold {:.4})",
                self.name, self.threshold
            ),
        }
    }
}

#[cfg(test)]
#[path = "rule_tests.rs"]
mod tests;
