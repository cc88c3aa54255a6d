// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only rolling CSV sink for samples the primary store refused.
//!
//! Files are named `overflow_<UTCyyyyMMdd_HHmmss>.csv`, rotate at a size
//! bound, optionally gzip on rotation, and are deleted after a retention
//! period by an hourly sweep.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::events::{EdgeEvent, EventHub};
use crate::model::TypedSample;

const CSV_HEADER: &[&str] =
    &["DeviceId", "TagId", "Ts", "Seq", "ValueType", "Value", "Quality", "Source", "Protocol"];

/// Marker written in the `Source` column; the writer is the only producer.
const SOURCE: &str = "writer";

/// Hourly retention sweep.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct OverflowConfig {
    pub dir: PathBuf,
    pub roll_size_mb: u64,
    pub retention_days: u32,
    /// Gzip files as they rotate out.
    pub compress: bool,
}

impl Default for OverflowConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("overflow"),
            roll_size_mb: 64,
            retention_days: 7,
            compress: true,
        }
    }
}

struct OpenFile {
    writer: csv::Writer<BufWriter<File>>,
    path: PathBuf,
    bytes: u64,
}

/// The rolling sink. `append` is serialized; rotation compression runs on
/// a blocking worker so the caller is not held up.
pub struct OverflowSink {
    config: OverflowConfig,
    current: Mutex<Option<OpenFile>>,
    overflowed: AtomicU64,
    events: Option<Arc<EventHub>>,
}

impl OverflowSink {
    pub fn new(config: OverflowConfig, events: Option<Arc<EventHub>>) -> Self {
        Self { config, current: Mutex::new(None), overflowed: AtomicU64::new(0), events }
    }

    /// Total samples ever appended.
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Append a batch as CSV rows, rotating first when the current file is
    /// over the size bound.
    pub async fn append(&self, samples: &[TypedSample]) -> std::io::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut current = self.current.lock().await;

        if let Some(open) = current.as_ref() {
            if open.bytes >= self.config.roll_size_mb * 1024 * 1024 {
                let closed = current.take();
                if let Some(closed) = closed {
                    self.rotate(closed)?;
                }
            }
        }
        if current.is_none() {
            *current = Some(self.open_new()?);
        }
        let open = current.as_mut().ok_or_else(|| {
            std::io::Error::other("overflow file unavailable")
        })?;

        for sample in samples {
            let row = [
                sample.device_id.clone(),
                sample.tag_id.clone(),
                sample.ts.to_string(),
                sample.seq.to_string(),
                sample.value_type.as_str().to_owned(),
                sample.value.render(),
                sample.quality.to_string(),
                SOURCE.to_owned(),
                sample.protocol.clone(),
            ];
            open.bytes += row.iter().map(|f| f.len() as u64 + 1).sum::<u64>();
            open.writer.write_record(&row)?;
        }
        open.writer.flush()?;
        self.overflowed.fetch_add(samples.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Delete overflow files older than the retention period. Returns the
    /// number removed.
    pub fn cleanup(&self) -> std::io::Result<usize> {
        if !self.config.dir.exists() {
            return Ok(0);
        }
        let cutoff = std::time::SystemTime::now()
            .checked_sub(Duration::from_secs(self.config.retention_days as u64 * 86_400));
        let Some(cutoff) = cutoff else { return Ok(0) };

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.config.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("overflow_") {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified());
            if let Ok(modified) = modified {
                if modified < cutoff {
                    std::fs::remove_file(entry.path())?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn open_new(&self) -> std::io::Result<OpenFile> {
        std::fs::create_dir_all(&self.config.dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let mut path = self.config.dir.join(format!("overflow_{stamp}.csv"));
        let mut n = 1;
        while path.exists() {
            path = self.config.dir.join(format!("overflow_{stamp}_{n}.csv"));
            n += 1;
        }

        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "overflow file opened");
        Ok(OpenFile { writer, path, bytes: 0 })
    }

    fn rotate(&self, mut closed: OpenFile) -> std::io::Result<()> {
        closed.writer.flush()?;
        drop(closed.writer);
        tracing::info!(path = %closed.path.display(), "overflow file rotated");

        if let Some(events) = &self.events {
            events.publish(EdgeEvent::OverflowRotated {
                path: closed.path.display().to_string(),
            });
        }

        if self.config.compress {
            let path = closed.path;
            tokio::task::spawn_blocking(move || {
                if let Err(e) = gzip_file(&path) {
                    tracing::warn!(path = %path.display(), err = %e, "overflow compression failed");
                }
            });
        }
        Ok(())
    }
}

/// Compress `path` to `path.gz` and remove the original.
fn gzip_file(path: &Path) -> std::io::Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    let mut input = File::open(path)?;
    let output = File::create(&gz_path)?;
    let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
    }
    encoder.finish()?;
    std::fs::remove_file(path)?;
    Ok(())
}

/// Spawn the hourly retention sweep.
pub fn spawn_cleanup(sink: Arc<OverflowSink>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            match sink.cleanup() {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "overflow retention sweep"),
                Err(e) => tracing::warn!(err = %e, "overflow retention sweep failed"),
            }
        }
    });
}

#[cfg(test)]
#[path = "overflow_tests.rs"]
mod tests;
