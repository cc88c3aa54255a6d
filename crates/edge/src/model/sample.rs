// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical typed sample produced by the collectors.

use serde::{Deserialize, Serialize};

/// OPC-style quality: value is good.
pub const QUALITY_GOOD: i32 = 192;
/// OPC-style quality: value is uncertain.
pub const QUALITY_UNCERTAIN: i32 = 64;
/// OPC-style quality: value is bad.
pub const QUALITY_BAD: i32 = 0;

/// Canonical value types a sample can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    /// Epoch milliseconds carried in the Int64 slot semantics.
    DateTime,
    ByteArray,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int8 => "Int8",
            Self::UInt8 => "UInt8",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::ByteArray => "ByteArray",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single populated value slot of a [`TypedSample`].
///
/// Exactly one variant exists per sample and it must match the sample's
/// declared [`ValueType`]; [`TypedSample::is_valid`] checks the pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Epoch milliseconds.
    DateTime(i64),
    ByteArray(Vec<u8>),
}

impl SampleValue {
    /// The value type this slot corresponds to.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int8(_) => ValueType::Int8,
            Self::UInt8(_) => ValueType::UInt8,
            Self::Int16(_) => ValueType::Int16,
            Self::UInt16(_) => ValueType::UInt16,
            Self::Int32(_) => ValueType::Int32,
            Self::UInt32(_) => ValueType::UInt32,
            Self::Int64(_) => ValueType::Int64,
            Self::UInt64(_) => ValueType::UInt64,
            Self::Float32(_) => ValueType::Float32,
            Self::Float64(_) => ValueType::Float64,
            Self::String(_) => ValueType::String,
            Self::DateTime(_) => ValueType::DateTime,
            Self::ByteArray(_) => ValueType::ByteArray,
        }
    }

    /// Numeric scalar for rule evaluation.
    ///
    /// Bools map to 0/1, numeric types widen to f64, strings parse as a
    /// plain decimal number. `None` for byte arrays and unparsable strings;
    /// such samples are skipped by the evaluators.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int8(v) => Some(*v as f64),
            Self::UInt8(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::UInt16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float32(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            Self::DateTime(v) => Some(*v as f64),
            Self::ByteArray(_) => None,
        }
    }

    /// Render the value for the overflow CSV and log messages.
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int8(v) => v.to_string(),
            Self::UInt8(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::UInt16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::UInt32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::UInt64(v) => v.to_string(),
            Self::Float32(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::String(s) => s.clone(),
            Self::DateTime(v) => v.to_string(),
            Self::ByteArray(b) => {
                let mut out = String::with_capacity(b.len() * 2);
                for byte in b {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
        }
    }
}

/// An immutable typed sample point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedSample {
    pub device_id: String,
    pub tag_id: String,
    /// Epoch milliseconds; always > 0 for valid samples.
    pub ts: i64,
    /// Monotonic per-process sequence number.
    pub seq: u64,
    pub value_type: ValueType,
    pub value: SampleValue,
    pub quality: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub protocol: String,
}

impl TypedSample {
    /// Invariant check: the value slot matches the declared type and the
    /// timestamp is positive.
    pub fn is_valid(&self) -> bool {
        self.ts > 0 && self.value.value_type() == self.value_type
    }

    /// Numeric scalar for rule evaluation (see [`SampleValue::scalar`]).
    pub fn scalar(&self) -> Option<f64> {
        self.value.scalar()
    }

    pub fn is_good(&self) -> bool {
        self.quality == QUALITY_GOOD
    }
}

#[cfg(test)]
#[path = "sample_tests.rs"]
mod tests;
