// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synthetic sample producer for running the full pipeline without
//! hardware.
//!
//! Implements [`ProtocolClient`], so everything downstream of the pool is
//! identical to a live run. Waveform selection is a tag-name heuristic:
//! sine for temperatures/pressures, ramp for levels, toggle for
//! run/switch bits, counter for totalizers, and a bounded random walk for
//! the rest. The declared tag type decides the raw value shape.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::collect::client::{ProtocolClient, ProtocolHandle, RawQuality, RawValue, TagRead};
use crate::error::ProtocolError;
use crate::model::{epoch_ms, EndpointDescriptor, TagDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waveform {
    Sine,
    Ramp,
    Toggle,
    Counter,
    Random,
}

fn pick_waveform(tag_id: &str) -> Waveform {
    let name = tag_id.to_ascii_lowercase();
    if name.contains("temp") || name.contains("press") || name.contains("sine") {
        Waveform::Sine
    } else if name.contains("level") || name.contains("ramp") {
        Waveform::Ramp
    } else if name.contains("run") || name.contains("switch") || name.contains("toggle") {
        Waveform::Toggle
    } else if name.contains("count") || name.contains("total") {
        Waveform::Counter
    } else {
        Waveform::Random
    }
}

/// Synthetic protocol client. Cheap to clone per endpoint; each handle
/// keeps its own per-tag phase state.
pub struct SimulatedClient {
    seed: u64,
}

impl SimulatedClient {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl ProtocolClient for SimulatedClient {
    async fn connect(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Box<dyn ProtocolHandle>, ProtocolError> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        endpoint.endpoint_id.hash(&mut hasher);
        Ok(Box::new(SimulatedHandle {
            rng: Mutex::new(SmallRng::seed_from_u64(self.seed ^ hasher.finish())),
            iterations: Mutex::new(HashMap::new()),
        }))
    }
}

struct SimulatedHandle {
    rng: Mutex<SmallRng>,
    iterations: Mutex<HashMap<String, u64>>,
}

impl SimulatedHandle {
    fn next_value(&self, tag: &TagDescriptor) -> RawValue {
        let iter = {
            let mut iters = match self.iterations.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            let n = iters.entry(tag.tag_id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let noise: f64 = {
            let mut rng = match self.rng.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            rng.random::<f64>()
        };

        let scalar = match pick_waveform(&tag.tag_id) {
            Waveform::Sine => {
                let phase = (epoch_ms() as f64 / 10_000.0) * std::f64::consts::TAU;
                50.0 + 40.0 * phase.sin() + noise
            }
            Waveform::Ramp => (iter % 100) as f64 + noise,
            Waveform::Toggle => (iter % 2) as f64,
            Waveform::Counter => iter as f64,
            Waveform::Random => noise * 100.0,
        };

        shape_raw(tag.declared_type.as_deref().unwrap_or(""), scalar)
    }
}

/// Cast the scalar into the raw shape the declared type expects, so the
/// type mapper treats simulated reads exactly like wire reads. Tags with
/// no declared type read as `f64` and rely on downstream inference.
fn shape_raw(declared: &str, scalar: f64) -> RawValue {
    let d = declared.trim();
    let eq = |s: &str| d.eq_ignore_ascii_case(s);
    if eq("Boolean") || eq("BOOL") {
        RawValue::Bool(scalar >= 1.0)
    } else if eq("SByte") || eq("SINT") {
        RawValue::I8(scalar as i8)
    } else if eq("Byte") || eq("USINT") {
        RawValue::U8(scalar as u8)
    } else if eq("Int16") || eq("INT") {
        RawValue::I16(scalar as i16)
    } else if eq("UInt16") || eq("UINT") {
        RawValue::U16(scalar as u16)
    } else if eq("Int32") || eq("DINT") {
        RawValue::I32(scalar as i32)
    } else if eq("UInt32") || eq("UDINT") {
        RawValue::U32(scalar as u32)
    } else if eq("Int64") || eq("LINT") {
        RawValue::I64(scalar as i64)
    } else if eq("UInt64") || eq("ULINT") {
        RawValue::U64(scalar as u64)
    } else if eq("Float") || eq("REAL") {
        RawValue::F32(scalar as f32)
    } else if eq("Double") || eq("LREAL") {
        RawValue::F64(scalar)
    } else if eq("String") || eq("STRING") {
        RawValue::Str(format!("{scalar:.2}"))
    } else if eq("DateTime") {
        RawValue::DateTimeMs(epoch_ms())
    } else {
        RawValue::F64(scalar)
    }
}

#[async_trait]
impl ProtocolHandle for SimulatedHandle {
    async fn read_batch(&mut self, tags: &[TagDescriptor]) -> Result<Vec<TagRead>, ProtocolError> {
        Ok(tags
            .iter()
            .map(|tag| TagRead {
                tag_id: tag.tag_id.clone(),
                result: Ok((self.next_value(tag), RawQuality::Good)),
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "simulate_tests.rs"]
mod tests;
