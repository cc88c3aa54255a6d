// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the collectors, pool, and stores.
//!
//! Nothing here is fatal: every kind maps to a per-loop policy (drop, skip,
//! backoff, retry, overflow). Only cancellation terminates a loop.

use serde::{Deserialize, Serialize};

use crate::model::ValueType;

/// Classification of a read outcome, used by health counters and the
/// collector's failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadErrorKind {
    Timeout,
    NoRoute,
    BadTag,
    TypeMismatch,
    TooManyConn,
    Unknown,
}

impl ReadErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::NoRoute => "NO_ROUTE",
            Self::BadTag => "BAD_TAG",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::TooManyConn => "TOO_MANY_CONN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether this failure marks the endpoint faulted (pool backoff).
    pub fn faults_endpoint(&self) -> bool {
        matches!(self, Self::NoRoute | Self::TooManyConn)
    }
}

impl std::fmt::Display for ReadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-level failure reported by a client or handle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error("read timed out after {0} ms")]
    Timeout(u64),
    #[error("no route to endpoint: {0}")]
    NoRoute(String),
    #[error("endpoint refused connection: too many sessions")]
    TooManyConnections,
    #[error("bad tag address: {0}")]
    BadTag(String),
    #[error("{0}")]
    Other(String),
}

impl ProtocolError {
    pub fn kind(&self) -> ReadErrorKind {
        match self {
            Self::Timeout(_) => ReadErrorKind::Timeout,
            Self::NoRoute(_) => ReadErrorKind::NoRoute,
            Self::TooManyConnections => ReadErrorKind::TooManyConn,
            Self::BadTag(_) => ReadErrorKind::BadTag,
            Self::Other(_) => ReadErrorKind::Unknown,
        }
    }
}

/// Declared type and actual raw type disagreed; the sample is discarded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("type mismatch on {device_id}/{tag_id}: expected {expected}, got {actual}")]
pub struct TypeMismatchError {
    pub device_id: String,
    pub tag_id: String,
    pub expected: ValueType,
    /// Human-readable description of the raw value's runtime type.
    pub actual: &'static str,
}

/// Pool acquisition failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// The endpoint is at its family-clamped handle limit.
    #[error("pool busy: {endpoint_id} at {limit} handles")]
    Busy { endpoint_id: String, limit: usize },
    /// The endpoint is faulted and inside its backoff window.
    #[error("pool faulted: {endpoint_id}, retry in {retry_in_ms} ms")]
    Faulted { endpoint_id: String, retry_in_ms: u64 },
}

/// Persistence-boundary failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An Open/Acknowledged alarm with this code already exists.
    /// Callers treat this as "already open" and suppress.
    #[error("open alarm already exists for code {0}")]
    OpenAlarmExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Transient backend failure; retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid argument: {0}")]
    Invalid(String),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
