// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregated edge events for downstream consumers (dashboards,
//! notification relays). The broadcast buffer is bounded and slow
//! subscribers miss events rather than back-pressuring the core.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{AlarmGroup, AlarmRecord};

/// Events emitted by the edge core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeEvent {
    /// A new alarm record was persisted.
    AlarmCreated { alarm: AlarmRecord },
    /// An aggregation group was created or extended.
    AlarmGroupUpdated { group: AlarmGroup },
    /// An endpoint changed pool condition.
    EndpointStateChanged { endpoint_id: String, state: String },
    /// The overflow sink rotated to a new file.
    OverflowRotated { path: String },
    /// The fan-in pipeline dropped samples since the last report.
    PipelineCongested { dropped: u64 },
}

/// Broadcast hub for [`EdgeEvent`]s.
pub struct EventHub {
    tx: broadcast::Sender<EdgeEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EdgeEvent> {
        self.tx.subscribe()
    }

    /// Publish; silently a no-op with no subscribers.
    pub fn publish(&self, event: EdgeEvent) {
        let _ = self.tx.send(event);
    }
}
