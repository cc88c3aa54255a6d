// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol collectors: typed-sample production from live endpoints.
//!
//! One scan loop runs per (endpoint, scan group); loops share nothing but
//! the connection pool and the output queue, so a faulty group cannot
//! starve another.

pub mod client;
pub mod health;
pub mod pool;
pub mod scan;
pub mod simulate;
pub mod typemap;

pub use client::{ProtocolClient, ProtocolHandle, RawQuality, RawValue, TagRead};
pub use health::{CollectorHealth, CollectorState, HealthTracker};
pub use pool::ConnectionPool;
pub use scan::{spawn_collector, CollectorSet};
