// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical type mapping (raw protocol value → [`TypedSample`]).
//!
//! The declared type hint from the tag descriptor is authoritative. There is
//! no implicit widening or narrowing: an `i32` off the wire against a
//! declared `Float32` is a mismatch and the sample is discarded. This module
//! is the single site allowed to construct a [`SampleValue`] from a raw
//! value.

use crate::collect::client::{RawQuality, RawValue};
use crate::error::TypeMismatchError;
use crate::model::sample::{QUALITY_BAD, QUALITY_GOOD, QUALITY_UNCERTAIN};
use crate::model::{Protocol, SampleValue, TypedSample, ValueType};

/// Resolve the canonical value type for a tag.
///
/// A known declared hint wins. With no hint, the raw value's own runtime
/// type is used. An unknown hint fails rather than guessing.
pub fn map_type(
    protocol: Protocol,
    device_id: &str,
    tag_id: &str,
    declared: Option<&str>,
    raw: &RawValue,
) -> Result<ValueType, TypeMismatchError> {
    match declared {
        Some(hint) => hint_to_value_type(protocol, hint).ok_or_else(|| TypeMismatchError {
            device_id: device_id.to_owned(),
            tag_id: tag_id.to_owned(),
            expected: infer(raw),
            actual: "unknown declared type",
        }),
        None => Ok(infer(raw)),
    }
}

/// Build a [`TypedSample`], failing fast when the raw value's runtime type
/// does not match the expected canonical type.
#[allow(clippy::too_many_arguments)]
pub fn map_value(
    device_id: &str,
    tag_id: &str,
    expected: ValueType,
    raw: RawValue,
    quality: RawQuality,
    protocol: Protocol,
    unit: Option<String>,
    ts: i64,
    seq: u64,
) -> Result<TypedSample, TypeMismatchError> {
    let mismatch = |raw: &RawValue| TypeMismatchError {
        device_id: device_id.to_owned(),
        tag_id: tag_id.to_owned(),
        expected,
        actual: raw.type_name(),
    };

    let value = match (expected, raw) {
        (ValueType::Bool, RawValue::Bool(v)) => SampleValue::Bool(v),
        (ValueType::Int8, RawValue::I8(v)) => SampleValue::Int8(v),
        (ValueType::UInt8, RawValue::U8(v)) => SampleValue::UInt8(v),
        (ValueType::Int16, RawValue::I16(v)) => SampleValue::Int16(v),
        (ValueType::UInt16, RawValue::U16(v)) => SampleValue::UInt16(v),
        (ValueType::Int32, RawValue::I32(v)) => SampleValue::Int32(v),
        (ValueType::UInt32, RawValue::U32(v)) => SampleValue::UInt32(v),
        (ValueType::Int64, RawValue::I64(v)) => SampleValue::Int64(v),
        (ValueType::UInt64, RawValue::U64(v)) => SampleValue::UInt64(v),
        (ValueType::Float32, RawValue::F32(v)) => SampleValue::Float32(v),
        (ValueType::Float64, RawValue::F64(v)) => SampleValue::Float64(v),
        (ValueType::String, RawValue::Str(s)) => SampleValue::String(s),
        (ValueType::String, RawValue::Bytes(b)) => match decode_ab_string(&b) {
            Some(s) => SampleValue::String(s),
            None => return Err(mismatch(&RawValue::Bytes(b))),
        },
        (ValueType::DateTime, RawValue::DateTimeMs(ms)) => SampleValue::DateTime(ms),
        (ValueType::ByteArray, RawValue::Bytes(b)) => SampleValue::ByteArray(b),
        (_, raw) => return Err(mismatch(&raw)),
    };

    Ok(TypedSample {
        device_id: device_id.to_owned(),
        tag_id: tag_id.to_owned(),
        ts,
        seq,
        value_type: expected,
        value,
        quality: map_quality(quality),
        unit,
        protocol: protocol.as_str().to_owned(),
    })
}

/// Good → 192, Bad → 0, anything else → 64.
pub fn map_quality(q: RawQuality) -> i32 {
    match q {
        RawQuality::Good => QUALITY_GOOD,
        RawQuality::Bad => QUALITY_BAD,
        RawQuality::Uncertain => QUALITY_UNCERTAIN,
    }
}

/// AB-style string: `[len:i32 LE][bytes…]`. Reads `min(len, buffer-4)`
/// bytes and decodes as UTF-8 (lossy). `None` when the header is short.
fn decode_ab_string(buf: &[u8]) -> Option<String> {
    if buf.len() < 4 {
        return None;
    }
    let declared = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let declared = declared.max(0) as usize;
    let take = declared.min(buf.len() - 4);
    Some(String::from_utf8_lossy(&buf[4..4 + take]).into_owned())
}

/// Natural canonical type of a raw value, used when no hint is declared.
fn infer(raw: &RawValue) -> ValueType {
    match raw {
        RawValue::Bool(_) => ValueType::Bool,
        RawValue::I8(_) => ValueType::Int8,
        RawValue::U8(_) => ValueType::UInt8,
        RawValue::I16(_) => ValueType::Int16,
        RawValue::U16(_) => ValueType::UInt16,
        RawValue::I32(_) => ValueType::Int32,
        RawValue::U32(_) => ValueType::UInt32,
        RawValue::I64(_) => ValueType::Int64,
        RawValue::U64(_) => ValueType::UInt64,
        RawValue::F32(_) => ValueType::Float32,
        RawValue::F64(_) => ValueType::Float64,
        RawValue::Str(_) => ValueType::String,
        RawValue::Bytes(_) => ValueType::ByteArray,
        RawValue::DateTimeMs(_) => ValueType::DateTime,
    }
}

/// Declared-type tables per protocol. Matching is case-insensitive; CIP
/// aliases (WORD/DWORD/LWORD/BYTE) map to their unsigned integer widths.
fn hint_to_value_type(protocol: Protocol, hint: &str) -> Option<ValueType> {
    let h = hint.trim();
    let eq = |s: &str| h.eq_ignore_ascii_case(s);
    match protocol {
        Protocol::Cip => {
            if eq("BOOL") {
                Some(ValueType::Bool)
            } else if eq("SINT") {
                Some(ValueType::Int8)
            } else if eq("USINT") || eq("BYTE") {
                Some(ValueType::UInt8)
            } else if eq("INT") {
                Some(ValueType::Int16)
            } else if eq("UINT") || eq("WORD") {
                Some(ValueType::UInt16)
            } else if eq("DINT") {
                Some(ValueType::Int32)
            } else if eq("UDINT") || eq("DWORD") {
                Some(ValueType::UInt32)
            } else if eq("LINT") {
                Some(ValueType::Int64)
            } else if eq("ULINT") || eq("LWORD") {
                Some(ValueType::UInt64)
            } else if eq("REAL") {
                Some(ValueType::Float32)
            } else if eq("LREAL") {
                Some(ValueType::Float64)
            } else if eq("STRING") {
                Some(ValueType::String)
            } else {
                None
            }
        }
        Protocol::OpcUa => {
            if eq("Boolean") {
                Some(ValueType::Bool)
            } else if eq("SByte") {
                Some(ValueType::Int8)
            } else if eq("Byte") {
                Some(ValueType::UInt8)
            } else if eq("Int16") {
                Some(ValueType::Int16)
            } else if eq("UInt16") {
                Some(ValueType::UInt16)
            } else if eq("Int32") {
                Some(ValueType::Int32)
            } else if eq("UInt32") {
                Some(ValueType::UInt32)
            } else if eq("Int64") {
                Some(ValueType::Int64)
            } else if eq("UInt64") {
                Some(ValueType::UInt64)
            } else if eq("Float") {
                Some(ValueType::Float32)
            } else if eq("Double") {
                Some(ValueType::Float64)
            } else if eq("String") {
                Some(ValueType::String)
            } else if eq("DateTime") {
                Some(ValueType::DateTime)
            } else if eq("ByteString") {
                Some(ValueType::ByteArray)
            } else {
                None
            }
        }
        // Simulated tags reuse the UA table.
        Protocol::Simulated => hint_to_value_type(Protocol::OpcUa, hint),
    }
}

#[cfg(test)]
#[path = "typemap_tests.rs"]
mod tests;
