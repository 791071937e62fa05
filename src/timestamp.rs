use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

/// Current wall-clock time as fractional seconds since the epoch.
///
/// This is the representation persisted in the metadata store
/// (`mtime`, `ctime`, `last_scrub`, `last_skip`); scheduler deadlines use
/// monotonic [`std::time::Instant`]s instead.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The stat triple the scrubber cares about, in store representation.
///
/// A ctime change with a reverted mtime would otherwise produce a
/// false positive, so ctime is tracked alongside size and mtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSnapshot {
    pub size: u64,
    pub ctime: f64,
    pub mtime: f64,
}

impl From<&Metadata> for StatSnapshot {
    fn from(meta: &Metadata) -> Self {
        StatSnapshot {
            size: meta.len(),
            ctime: meta.ctime() as f64 + meta.ctime_nsec() as f64 * 1e-9,
            mtime: meta.mtime() as f64 + meta.mtime_nsec() as f64 * 1e-9,
        }
    }
}

/// Renders an epoch-seconds timestamp for `status -v` output.
pub fn format_epoch(secs: f64) -> String {
    let nanos = (secs.fract() * 1e9) as u32;
    match DateTime::from_timestamp(secs as i64, nanos) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => format!("@{secs:.0}"),
    }
}
