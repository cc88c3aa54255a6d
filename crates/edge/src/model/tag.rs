// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoint, scan group, and tag descriptors loaded from the fleet file.

use serde::{Deserialize, Serialize};

/// Collector protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    OpcUa,
    /// Allen-Bradley CIP (EtherNet/IP).
    Cip,
    /// Synthetic waveform producer.
    Simulated,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpcUa => "opcua",
            Self::Cip => "cip",
            Self::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PLC hardware family; bounds the per-endpoint connection clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlcFamily {
    ControlLogix,
    CompactLogix,
    Micro800,
    #[default]
    Generic,
}

impl PlcFamily {
    /// Hard upper bound on concurrent handles for this family.
    pub fn max_connections(&self) -> usize {
        match self {
            Self::ControlLogix => 8,
            Self::CompactLogix => 4,
            Self::Micro800 => 2,
            Self::Generic => 4,
        }
    }

    /// Clamp a configured connection limit to the family bound.
    pub fn clamp(&self, configured: usize) -> usize {
        configured.clamp(1, self.max_connections())
    }
}

/// A single PLC or OPC UA server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub endpoint_id: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// CIP routing path, e.g. `"1,0"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cip_path: Option<String>,
    #[serde(default)]
    pub family: PlcFamily,
    /// OPC UA security policy URI; `None` means no security.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Requested handle limit; clamped by [`PlcFamily::clamp`].
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    4
}

impl EndpointDescriptor {
    /// Effective handle limit after the family clamp.
    pub fn connection_limit(&self) -> usize {
        self.family.clamp(self.max_connections)
    }
}

/// A named set of tags sharing a polling interval within one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanGroup {
    pub name: String,
    /// Polling interval; never below 100 ms.
    pub scan_interval_ms: u64,
    /// Max tags per batch read.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub tags: Vec<TagDescriptor>,
}

fn default_batch_size() -> usize {
    50
}

impl ScanGroup {
    pub const MIN_INTERVAL_MS: u64 = 100;

    /// Effective interval with the floor applied.
    pub fn interval_ms(&self) -> u64 {
        self.scan_interval_ms.max(Self::MIN_INTERVAL_MS)
    }
}

/// One monitored address on an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDescriptor {
    pub tag_id: String,
    pub device_id: String,
    /// Protocol-native identifier (UA node id, CIP tag name).
    pub address: String,
    /// Declared protocol type hint, e.g. CIP `REAL`, UA `Float`. When
    /// absent, the canonical type is inferred from the first raw value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
