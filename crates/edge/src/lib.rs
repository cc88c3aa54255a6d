// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IntelliMaint edge: industrial telemetry ingestion and alarm evaluation.
//!
//! The data path: protocol collectors produce typed samples into a bounded
//! fan-in pipeline; a dispatcher replicates them to the batch writer and
//! the evaluators; evaluators emit alarm intents that the sink persists
//! and aggregates. Everything runs under one root cancellation token.

pub mod alarm;
pub mod collect;
pub mod config;
pub mod error;
pub mod events;
pub mod evaluate;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod state;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collect::client::ProtocolClient;
use crate::collect::pool::{spawn_reaper, ConnectionPool};
use crate::collect::scan::{CollectorSet, CollectorSpec};
use crate::collect::simulate::SimulatedClient;
use crate::config::{EdgeConfig, FleetConfig};
use crate::evaluate::lastdata;
use crate::evaluate::offline::OfflineDetector;
use crate::evaluate::registry::spawn_refresher;
use crate::evaluate::roc::RocEvaluator;
use crate::evaluate::runtime::spawn_state_sweeper;
use crate::evaluate::threshold::ThresholdEvaluator;
use crate::evaluate::volatility::VolatilityEvaluator;
use crate::events::EdgeEvent;
use crate::model::Protocol;
use crate::persist::batch::{BatchWriter, WriterConfig};
use crate::persist::overflow::{spawn_cleanup, OverflowConfig, OverflowSink};
use crate::pipeline::dispatch::{DispatchTarget, Dispatcher};
use crate::state::{EdgeHealth, EdgeState, Stores};
use crate::store::file::FileRuleStore;
use crate::store::memory::{
    MemoryAlarmStore, MemoryLastSeenStore, MemoryRuleStore, MemoryTelemetryStore,
};

/// How long shutdown waits for the writer's final drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A running edge instance.
pub struct EdgeHandles {
    pub state: Arc<EdgeState>,
    pub writer: Arc<BatchWriter>,
    pub overflow: Arc<OverflowSink>,
    pub collectors: Vec<Arc<CollectorSet>>,
    pub targets: Vec<Arc<DispatchTarget>>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for EdgeHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeHandles")
            .field("collectors", &self.collectors.len())
            .field("targets", &self.targets.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl EdgeHandles {
    /// Ordered teardown: stop the collectors first so nothing new enters
    /// the pipeline, then cancel the root token and join the downstream
    /// loops, which drain before exiting.
    pub async fn shutdown(self) {
        for set in &self.collectors {
            set.stop().await;
        }
        self.state.shutdown.cancel();
        for task in self.tasks {
            if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                tracing::warn!("worker did not stop within the drain timeout");
            }
        }
    }

    /// Health snapshot across every subsystem.
    pub async fn health(&self) -> EdgeHealth {
        let mut collectors = Vec::new();
        for set in &self.collectors {
            for ((endpoint, group), health) in set.health().await {
                collectors.push((format!("{endpoint}/{group}"), health));
            }
        }
        EdgeHealth {
            pipeline: self.state.pipeline.counters(),
            targets: self.targets.iter().map(|t| t.counters()).collect(),
            writer: self.writer.metrics(),
            collectors,
        }
    }
}

/// Build and spawn the full pipeline against the given stores and protocol
/// clients. Returns handles for shutdown and inspection.
pub async fn bootstrap(
    config: EdgeConfig,
    fleet: FleetConfig,
    stores: Stores,
    clients: HashMap<Protocol, Arc<dyn ProtocolClient>>,
    shutdown: CancellationToken,
) -> anyhow::Result<EdgeHandles> {
    let state = Arc::new(EdgeState::new(config, stores, shutdown));
    let cancel = state.shutdown.clone();
    let mut tasks = Vec::new();

    // Rule registry refresh loop (first refresh is immediate).
    spawn_refresher(
        Arc::clone(&state.registry),
        state.config.rule_refresh_interval(),
        cancel.clone(),
    );

    // Dispatch targets, one bounded queue per consumer.
    let capacity = state.config.target_capacity;
    let (writer_target, writer_rx) = DispatchTarget::bounded("writer", capacity);
    let (threshold_target, threshold_rx) = DispatchTarget::bounded("threshold", capacity);
    let (roc_target, roc_rx) = DispatchTarget::bounded("roc", capacity);
    let (volatility_target, volatility_rx) = DispatchTarget::bounded("volatility", capacity);
    let (lastdata_target, lastdata_rx) = DispatchTarget::bounded("last-data", capacity);
    let targets = vec![
        Arc::clone(&writer_target),
        Arc::clone(&threshold_target),
        Arc::clone(&roc_target),
        Arc::clone(&volatility_target),
        Arc::clone(&lastdata_target),
    ];

    let dispatcher = Dispatcher::new(Arc::clone(&state.pipeline), targets.clone());
    tasks.push(tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    }));

    // Persistence leg.
    let overflow = Arc::new(OverflowSink::new(
        OverflowConfig {
            dir: state.config.overflow_dir.clone(),
            roll_size_mb: state.config.overflow_roll_mb,
            retention_days: state.config.overflow_retention_days,
            compress: state.config.overflow_compress,
        },
        Some(Arc::clone(&state.events)),
    ));
    spawn_cleanup(Arc::clone(&overflow), cancel.clone());

    let writer = BatchWriter::new(
        Arc::clone(&state.stores.telemetry),
        Arc::clone(&overflow),
        WriterConfig {
            batch_size: state.config.batch_size,
            flush_ms: state.config.flush_ms,
            max_retries: state.config.max_retries,
            ..Default::default()
        },
    );
    tasks.push(tokio::spawn(Arc::clone(&writer).run(writer_rx, cancel.clone())));

    // Alarm sink and evaluators.
    let (intent_tx, intent_rx) = tokio::sync::mpsc::channel(1024);
    tasks.push(tokio::spawn(alarm::run_alarm_sink(
        Arc::clone(&state.stores.alarms),
        Arc::clone(&state.aggregator),
        Arc::clone(&state.events),
        intent_rx,
        cancel.clone(),
    )));

    let threshold = ThresholdEvaluator::new(
        state.registry.subscribe(),
        Arc::clone(&state.runtime),
        Arc::clone(&state.stores.alarms),
        intent_tx.clone(),
    );
    tasks.push(tokio::spawn(threshold.run(threshold_rx, cancel.clone())));

    let roc = RocEvaluator::new(
        state.registry.subscribe(),
        Arc::clone(&state.windows),
        Arc::clone(&state.runtime),
        Arc::clone(&state.stores.alarms),
        intent_tx.clone(),
    );
    tasks.push(tokio::spawn(roc.run(roc_rx, cancel.clone())));

    let volatility = VolatilityEvaluator::new(
        state.registry.subscribe(),
        Arc::clone(&state.windows),
        Arc::clone(&state.runtime),
        Arc::clone(&state.stores.alarms),
        intent_tx.clone(),
    );
    tasks.push(tokio::spawn(volatility.run(volatility_rx, cancel.clone())));

    let offline = OfflineDetector::new(
        state.registry.subscribe(),
        Arc::clone(&state.tracker),
        Arc::clone(&state.runtime),
        Arc::clone(&state.stores.alarms),
        intent_tx,
    );
    let sweep_interval = state.config.offline_sweep_interval();
    tasks.push(tokio::spawn(offline.run(sweep_interval, cancel.clone())));

    tasks.push(tokio::spawn(lastdata::run_consumer(
        Arc::clone(&state.tracker),
        lastdata_rx,
        cancel.clone(),
    )));
    lastdata::spawn_flusher(
        Arc::clone(&state.tracker),
        Arc::clone(&state.stores.last_seen),
        lastdata::FLUSH_INTERVAL,
        cancel.clone(),
    );
    spawn_state_sweeper(Arc::clone(&state.runtime), cancel.clone());

    // Collectors: one pool and one loop set per protocol in the fleet.
    let mut by_protocol: HashMap<Protocol, Vec<CollectorSpec>> = HashMap::new();
    for spec in fleet.collector_specs() {
        by_protocol.entry(spec.endpoint.protocol).or_default().push(spec);
    }
    let mut collectors = Vec::new();
    for (protocol, specs) in by_protocol {
        let client = clients
            .get(&protocol)
            .with_context(|| format!("no protocol client registered for {protocol}"))?;
        let pool = ConnectionPool::new(Arc::clone(client), Some(Arc::clone(&state.events)));
        spawn_reaper(Arc::clone(&pool), cancel.clone());
        let set = Arc::new(CollectorSet::new(
            pool,
            Arc::clone(&state.pipeline),
            Arc::clone(&state.seq),
            cancel.clone(),
        ));
        set.start(&specs).await;
        tracing::info!(
            protocol = %protocol,
            endpoints = specs.len(),
            loops = specs.iter().map(|s| s.groups.len()).sum::<usize>(),
            "collectors started"
        );
        collectors.push(set);
    }

    let handles = EdgeHandles {
        state: Arc::clone(&state),
        writer,
        overflow,
        collectors,
        targets,
        tasks,
    };
    spawn_health_logger(&handles);
    Ok(handles)
}

/// Periodic health summary plus pipeline congestion events.
fn spawn_health_logger(handles: &EdgeHandles) {
    let state = Arc::clone(&handles.state);
    let writer = Arc::clone(&handles.writer);
    let targets = handles.targets.clone();
    let interval = state.config.health_log_interval();

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_dropped = 0u64;
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }
            let counters = state.pipeline.counters();
            let dropped_delta = counters.total_dropped.saturating_sub(last_dropped);
            if dropped_delta > 0 {
                state.events.publish(EdgeEvent::PipelineCongested { dropped: dropped_delta });
            }
            last_dropped = counters.total_dropped;

            let metrics = writer.metrics();
            tracing::info!(
                received = counters.total_received,
                dropped = counters.total_dropped,
                depth = counters.queue_depth,
                written = metrics.written_total,
                overflowed = metrics.overflowed,
                target_drops = targets.iter().map(|t| t.counters().dropped).sum::<u64>(),
                "pipeline health"
            );
        }
    });
}

/// Run the daemon until ctrl-c.
///
/// The binary wires the in-memory stores (plus the file-backed rule
/// repository when `--rules` is given); deployments with durable engines
/// implement the [`store`] traits and call [`bootstrap`] directly.
pub async fn run(config: EdgeConfig) -> anyhow::Result<()> {
    let fleet = FleetConfig::load(&config.fleet)?;

    let rules: Arc<dyn store::AlarmRuleRepository> = match &config.rules {
        Some(path) => Arc::new(FileRuleStore::new(path.clone())),
        None => Arc::new(MemoryRuleStore::new(Vec::new())),
    };
    let stores = Stores {
        telemetry: Arc::new(MemoryTelemetryStore::new()),
        alarms: Arc::new(MemoryAlarmStore::new()),
        rules,
        last_seen: Arc::new(MemoryLastSeenStore::new()),
    };

    let mut clients: HashMap<Protocol, Arc<dyn ProtocolClient>> = HashMap::new();
    let simulated: Arc<dyn ProtocolClient> = Arc::new(SimulatedClient::new(config.sim_seed));
    clients.insert(Protocol::Simulated, Arc::clone(&simulated));
    if config.simulate {
        // Every protocol in the fleet reads synthetic data.
        clients.insert(Protocol::OpcUa, Arc::clone(&simulated));
        clients.insert(Protocol::Cip, simulated);
    }

    let shutdown = CancellationToken::new();
    let handles = bootstrap(config, fleet, stores, clients, shutdown.clone()).await?;
    tracing::info!("intellimaint-edge running");

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    tracing::info!("shutting down");
    handles.shutdown().await;
    Ok(())
}
