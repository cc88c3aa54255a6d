// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol client boundary.
//!
//! A [`ProtocolClient`] dials one endpoint and yields [`ProtocolHandle`]s;
//! a handle performs batch reads of raw, untyped values. Everything typed
//! lives downstream of the [type mapper](crate::collect::typemap); handles
//! report what the wire gave them.

use async_trait::async_trait;

use crate::error::ProtocolError;
use crate::model::{EndpointDescriptor, TagDescriptor};

/// A raw value as decoded off the wire, before canonical typing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Already-decoded UTF-8 string (OPC UA String).
    Str(String),
    /// Undecoded bytes; AB STRING tags arrive here as `[len:i32 LE][data]`.
    Bytes(Vec<u8>),
    /// OPC UA DateTime converted to epoch milliseconds at the client.
    DateTimeMs(i64),
}

impl RawValue {
    /// Short description of the runtime type, for mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::DateTimeMs(_) => "datetime",
        }
    }
}

/// Wire-level quality as reported by the protocol stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawQuality {
    Good,
    Bad,
    Uncertain,
}

/// Outcome of reading one tag within a batch.
#[derive(Debug, Clone)]
pub struct TagRead {
    pub tag_id: String,
    pub result: Result<(RawValue, RawQuality), ProtocolError>,
}

/// Dials endpoints. One client exists per protocol; the pool calls
/// `connect` when it needs a fresh handle.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn connect(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Box<dyn ProtocolHandle>, ProtocolError>;
}

/// A live connection to one endpoint.
///
/// `read_batch` returns one [`TagRead`] per requested tag; a batch-level
/// `Err` means the whole read failed (route loss, timeout) and the handle
/// should be considered dead.
#[async_trait]
pub trait ProtocolHandle: Send + Sync {
    async fn read_batch(&mut self, tags: &[TagDescriptor]) -> Result<Vec<TagRead>, ProtocolError>;

    /// True when the underlying session is still usable.
    fn is_alive(&self) -> bool {
        true
    }
}
