// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: CLI/env flags plus the JSON fleet and rules
//! files.
//!
//! The rules loader is the single place that inspects condition-type
//! strings; everything downstream sees the stamped enums on
//! [`AlarmRule`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::collect::scan::CollectorSpec;
use crate::model::{
    AlarmRule, ConditionOp, EndpointDescriptor, RuleFamily, ScanGroup,
};
use crate::model::rule::RocMetric;

/// Configuration for the edge daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "intellimaint-edge", about = "Industrial telemetry and alarm edge daemon")]
pub struct EdgeConfig {
    /// Path to the fleet JSON (endpoints, scan groups, tags).
    #[arg(long, env = "INTELLIMAINT_FLEET", default_value = "fleet.json")]
    pub fleet: PathBuf,

    /// Path to the alarm rules JSON.
    #[arg(long, env = "INTELLIMAINT_RULES")]
    pub rules: Option<PathBuf>,

    /// Replace protocol clients with the synthetic waveform producer.
    #[arg(long, env = "INTELLIMAINT_SIMULATE")]
    pub simulate: bool,

    /// Seed for simulated waveforms.
    #[arg(long, default_value_t = 1, env = "INTELLIMAINT_SIM_SEED")]
    pub sim_seed: u64,

    /// Fan-in pipeline capacity (samples).
    #[arg(long, default_value_t = 100_000, env = "INTELLIMAINT_PIPELINE_CAPACITY")]
    pub pipeline_capacity: usize,

    /// Per-consumer dispatch queue capacity (samples).
    #[arg(long, default_value_t = 10_000, env = "INTELLIMAINT_TARGET_CAPACITY")]
    pub target_capacity: usize,

    /// Writer batch size.
    #[arg(long, default_value_t = 500, env = "INTELLIMAINT_BATCH_SIZE")]
    pub batch_size: usize,

    /// Writer flush interval in milliseconds.
    #[arg(long, default_value_t = 1000, env = "INTELLIMAINT_FLUSH_MS")]
    pub flush_ms: u64,

    /// Writer retries before a batch is diverted to overflow.
    #[arg(long, default_value_t = 5, env = "INTELLIMAINT_MAX_RETRIES")]
    pub max_retries: u32,

    /// Rule cache refresh interval in seconds.
    #[arg(long, default_value_t = 30, env = "INTELLIMAINT_RULE_REFRESH_SECS")]
    pub rule_refresh_secs: u64,

    /// Offline sweep interval in seconds.
    #[arg(long, default_value_t = 5, env = "INTELLIMAINT_OFFLINE_SWEEP_SECS")]
    pub offline_sweep_secs: u64,

    /// Directory for overflow CSV files.
    #[arg(long, default_value = "overflow", env = "INTELLIMAINT_OVERFLOW_DIR")]
    pub overflow_dir: PathBuf,

    /// Overflow file rotation size in MB.
    #[arg(long, default_value_t = 64, env = "INTELLIMAINT_OVERFLOW_ROLL_MB")]
    pub overflow_roll_mb: u64,

    /// Overflow retention in days.
    #[arg(long, default_value_t = 7, env = "INTELLIMAINT_OVERFLOW_RETENTION_DAYS")]
    pub overflow_retention_days: u32,

    /// Gzip rotated overflow files.
    #[arg(
        long,
        action = clap::ArgAction::Set,
        default_value_t = true,
        env = "INTELLIMAINT_OVERFLOW_COMPRESS"
    )]
    pub overflow_compress: bool,

    /// Health summary log interval in seconds.
    #[arg(long, default_value_t = 60, env = "INTELLIMAINT_HEALTH_LOG_SECS")]
    pub health_log_secs: u64,
}

impl EdgeConfig {
    pub fn rule_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.rule_refresh_secs.max(1))
    }

    pub fn offline_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.offline_sweep_secs.max(1))
    }

    pub fn health_log_interval(&self) -> Duration {
        Duration::from_secs(self.health_log_secs.max(1))
    }
}

// -- Fleet file ---------------------------------------------------------------

/// One endpoint with its scan groups, as configured on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetEndpoint {
    #[serde(flatten)]
    pub endpoint: EndpointDescriptor,
    pub scan_groups: Vec<ScanGroup>,
}

/// The fleet document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub endpoints: Vec<FleetEndpoint>,
}

impl FleetConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read fleet config {}", path.display()))?;
        let fleet: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parse fleet config {}", path.display()))?;
        fleet.validate()?;
        Ok(fleet)
    }

    /// Reject configurations the collectors cannot honor.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for ep in &self.endpoints {
            anyhow::ensure!(
                seen.insert(&ep.endpoint.endpoint_id),
                "duplicate endpoint id {}",
                ep.endpoint.endpoint_id
            );
            anyhow::ensure!(
                !ep.scan_groups.is_empty(),
                "endpoint {} has no scan groups",
                ep.endpoint.endpoint_id
            );
            for group in &ep.scan_groups {
                anyhow::ensure!(
                    group.scan_interval_ms >= ScanGroup::MIN_INTERVAL_MS,
                    "endpoint {} group {}: interval {} ms below the {} ms floor",
                    ep.endpoint.endpoint_id,
                    group.name,
                    group.scan_interval_ms,
                    ScanGroup::MIN_INTERVAL_MS
                );
                for tag in &group.tags {
                    anyhow::ensure!(
                        !tag.tag_id.is_empty() && !tag.device_id.is_empty(),
                        "endpoint {} group {}: tag with empty id",
                        ep.endpoint.endpoint_id,
                        group.name
                    );
                }
            }
        }
        Ok(())
    }

    pub fn collector_specs(&self) -> Vec<CollectorSpec> {
        self.endpoints
            .iter()
            .map(|ep| CollectorSpec {
                endpoint: ep.endpoint.clone(),
                groups: ep.scan_groups.clone(),
            })
            .collect()
    }
}

// -- Rules file ---------------------------------------------------------------

/// A rule as configured on disk, before condition-type stamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFileEntry {
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub device_id: Option<String>,
    pub tag_id: String,
    pub family: RuleFamily,
    /// Operator (`gt`, `lte`, …) or RoC metric (`roc_abs`, `roc_percent`).
    #[serde(default)]
    pub condition_type: Option<String>,
    pub threshold: f64,
    #[serde(default)]
    pub threshold_high: Option<f64>,
    pub severity: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: i64,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default = "default_roc_window_ms")]
    pub roc_window_ms: i64,
    #[serde(default)]
    pub message_template: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> i64 {
    5_000
}

fn default_roc_window_ms() -> i64 {
    60_000
}

impl RuleFileEntry {
    /// Stamp the condition-type string into the structured rule.
    pub fn into_rule(self) -> anyhow::Result<AlarmRule> {
        let (op, roc_metric) = match self.family {
            RuleFamily::Threshold => {
                let raw = self
                    .condition_type
                    .as_deref()
                    .with_context(|| format!("rule {}: threshold rule without condition_type", self.rule_id))?;
                let op = ConditionOp::parse(raw).with_context(|| {
                    format!("rule {}: unknown condition_type {raw:?}", self.rule_id)
                })?;
                (Some(op), None)
            }
            RuleFamily::Roc => {
                let metric = match self.condition_type.as_deref() {
                    Some("roc_abs") | Some("roc_absolute") | None => RocMetric::Absolute,
                    Some("roc_percent") => RocMetric::Percent,
                    Some(other) => {
                        anyhow::bail!("rule {}: unknown RoC condition_type {other:?}", self.rule_id)
                    }
                };
                (None, Some(metric))
            }
            RuleFamily::Offline | RuleFamily::Volatility => (None, None),
        };

        anyhow::ensure!(
            (1..=5).contains(&self.severity),
            "rule {}: severity {} outside 1..=5",
            self.rule_id,
            self.severity
        );

        Ok(AlarmRule {
            rule_id: self.rule_id,
            name: self.name,
            device_id: self.device_id,
            tag_id: self.tag_id,
            family: self.family,
            op,
            roc_metric,
            threshold: self.threshold,
            threshold_high: self.threshold_high,
            severity: self.severity,
            enabled: self.enabled,
            debounce_ms: self.debounce_ms,
            duration_ms: self.duration_ms,
            roc_window_ms: self.roc_window_ms,
            message_template: self.message_template,
        })
    }
}

/// Load and stamp the rules file.
pub fn load_rules(path: &std::path::Path) -> anyhow::Result<Vec<AlarmRule>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read rules config {}", path.display()))?;
    let entries: Vec<RuleFileEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("parse rules config {}", path.display()))?;
    entries.into_iter().map(RuleFileEntry::into_rule).collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
