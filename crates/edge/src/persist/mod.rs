// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence leg of the pipeline: the batched time-series writer and the
//! overflow sink that catches what the primary store refuses.

pub mod batch;
pub mod overflow;

pub use batch::{BatchWriter, WriterConfig, WriterMetrics};
pub use overflow::{OverflowConfig, OverflowSink};
