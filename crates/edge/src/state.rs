// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared edge state: the collaborators every loop receives at
//! construction instead of reaching for globals.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::alarm::aggregate::AlarmAggregator;
use crate::collect::health::CollectorHealth;
use crate::config::EdgeConfig;
use crate::evaluate::lastdata::LastDataTracker;
use crate::evaluate::registry::RuleRegistry;
use crate::evaluate::runtime::RuleRuntime;
use crate::evaluate::window::SlidingWindows;
use crate::events::EventHub;
use crate::persist::batch::WriterMetrics;
use crate::pipeline::dispatch::TargetCounters;
use crate::pipeline::{PipelineCounters, SamplePipeline};
use crate::store::{AlarmRuleRepository, AlarmStore, LastSeenStore, TelemetryRepository};

/// Persistence collaborators, behind their boundary traits.
#[derive(Clone)]
pub struct Stores {
    pub telemetry: Arc<dyn TelemetryRepository>,
    pub alarms: Arc<dyn AlarmStore>,
    pub rules: Arc<dyn AlarmRuleRepository>,
    pub last_seen: Arc<dyn LastSeenStore>,
}

/// Root context shared across the pipeline.
pub struct EdgeState {
    pub config: EdgeConfig,
    pub shutdown: CancellationToken,
    pub pipeline: Arc<SamplePipeline>,
    pub windows: Arc<SlidingWindows>,
    pub runtime: Arc<RuleRuntime>,
    pub tracker: Arc<LastDataTracker>,
    pub aggregator: Arc<AlarmAggregator>,
    pub events: Arc<EventHub>,
    pub registry: Arc<RuleRegistry>,
    pub stores: Stores,
    /// Process-global sample sequence.
    pub seq: Arc<AtomicU64>,
}

impl EdgeState {
    pub fn new(config: EdgeConfig, stores: Stores, shutdown: CancellationToken) -> Self {
        let pipeline = Arc::new(SamplePipeline::new(config.pipeline_capacity));
        let registry = Arc::new(RuleRegistry::new(Arc::clone(&stores.rules)));
        Self {
            config,
            shutdown,
            pipeline,
            windows: Arc::new(SlidingWindows::default()),
            runtime: RuleRuntime::new(),
            tracker: LastDataTracker::new(),
            aggregator: Arc::new(AlarmAggregator::new()),
            events: Arc::new(EventHub::new()),
            registry,
            stores,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Aggregated health snapshot, serializable for the periodic summary log
/// and external health probes.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeHealth {
    pub pipeline: PipelineCounters,
    pub targets: Vec<TargetCounters>,
    pub writer: WriterMetrics,
    /// Keyed `endpoint/group`.
    pub collectors: Vec<(String, CollectorHealth)>,
}
