//! The scrub scheduler.
//!
//! A single cooperative loop interleaves two kinds of work: *scan* ticks
//! (walking the roots and refreshing metadata records) and *read* ticks
//! (streaming one open file at a time through its digest). Each kind has its
//! own optional token bucket, and the loop always serves whichever deadline
//! is nearer, so a tight read limit cannot starve scanning and vice versa.
//!
//! The control flow is an explicit state machine:
//!
//! ```text
//! WalkTick ──exhausted──▶ metadata_clean ──▶ Drain ──▶ Done
//!    │  ▲                                     │
//!    ▼  │ (scan ahead of limit)               └─ hash leftovers under the
//! ReadTick ◀─────────┐                           read limit only
//!    │               │
//!    ├─ SleepScan ───┴──▶ WalkTick   (nothing to read before ts_scan)
//!    └─ SleepRead ───────▶ ReadTick  (short read delay, scan not yet due)
//! ```

use std::path::PathBuf;
use std::thread::sleep;
use std::time::Instant;

use log::debug;

use crate::discovery::{FileWalker, PathFilter};
use crate::error::Result;
use crate::node::{FileNode, ScrubOutcome};
use crate::rate::TokenBucket;
use crate::store::MetaDb;
use crate::timestamp::StatSnapshot;

/// Resolved knobs for one scrub pass.
pub struct ScrubOptions {
    pub roots: Vec<PathBuf>,
    pub xdev: bool,
    pub filter: PathFilter,
    /// Seconds before a skipped file may be retried.
    pub skip_for: f64,
    /// Bytes per read call.
    pub block_size: usize,
    pub scan_limit: Option<TokenBucket>,
    pub read_limit: Option<TokenBucket>,
    /// Update metadata records only; hash nothing.
    pub scan_only: bool,
}

/// Counters accumulated over one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrubStats {
    /// Files whose metadata was checked.
    pub scanned: u64,
    /// Files whose digest was computed to completion.
    pub hashed: u64,
    /// Bytes fed through digests.
    pub bytes_hashed: u64,
    /// Hashing attempts abandoned because the file mutated mid-read.
    pub skipped: u64,
    /// Digest mismatches explained by metadata.
    pub changed: u64,
    /// Digest mismatches with no metadata explanation.
    pub bitrot: u64,
}

enum State {
    WalkTick,
    ReadTick,
    SleepScan,
    SleepRead(std::time::Duration),
    Drain,
    Done,
}

/// Runs one scrub pass over the store.
pub fn run(db: &MetaDb, opts: ScrubOptions) -> Result<ScrubStats> {
    let ScrubOptions {
        roots,
        xdev,
        filter,
        skip_for,
        block_size,
        mut scan_limit,
        mut read_limit,
        scan_only,
    } = opts;

    debug!("scrub generation number: {}", db.generation());

    let mut walker = FileWalker::new(&roots, xdev, filter);
    let mut stats = ScrubStats::default();

    let start = Instant::now();
    // Earliest instants at which the next scan/read tick is permitted.
    let mut ts_scan = start;
    let mut ts_read = start;
    let mut file_node: Option<FileNode<'_>> = None;

    let mut state = State::WalkTick;
    loop {
        state = match state {
            State::WalkTick => match walker.next() {
                None => {
                    db.metadata_clean()?;
                    State::Drain
                }
                Some((path, meta)) => {
                    let snap = StatSnapshot::from(&meta);
                    db.metadata_check(&path, snap.size, snap.mtime, snap.ctime)?;
                    stats.scanned += 1;

                    match scan_limit.as_mut() {
                        None => State::WalkTick,
                        Some(bucket) => {
                            let delay = bucket.charge(1.0);
                            if delay.is_zero() {
                                State::WalkTick
                            } else {
                                ts_scan = Instant::now() + delay;
                                if scan_only {
                                    State::SleepScan
                                } else {
                                    State::ReadTick
                                }
                            }
                        }
                    }
                }
            },

            State::ReadTick => {
                let now = Instant::now();
                if now >= ts_scan {
                    State::WalkTick
                } else if file_node.is_none() && ts_read > ts_scan {
                    // Reads stay banned past the scan deadline; nothing
                    // useful to do until then.
                    State::SleepScan
                } else {
                    if file_node.is_none() {
                        file_node = db.get_file_to_scrub(skip_for)?;
                    }
                    match file_node.as_mut() {
                        None => State::SleepScan,
                        Some(node) => {
                            let n = node.read(block_size)?;
                            stats.bytes_hashed += n as u64;
                            if n == 0 {
                                finish_node(&mut file_node, &mut stats);
                            }
                            match read_limit.as_mut() {
                                None => State::ReadTick,
                                Some(bucket) => {
                                    let delay = bucket.charge(n as f64);
                                    if delay.is_zero() {
                                        State::ReadTick
                                    } else {
                                        let now = Instant::now();
                                        if now + delay >= ts_scan {
                                            // Scan comes due first.
                                            ts_read = now + delay;
                                            State::WalkTick
                                        } else {
                                            State::SleepRead(delay)
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }

            State::SleepScan => {
                let delay = ts_scan.saturating_duration_since(Instant::now());
                if !delay.is_zero() {
                    debug!("rate-limiting delay (scan): {:.1}s", delay.as_secs_f64());
                    sleep(delay);
                }
                State::WalkTick
            }

            State::SleepRead(delay) => {
                debug!("rate-limiting delay (read): {:.1}s", delay.as_secs_f64());
                sleep(delay);
                State::ReadTick
            }

            State::Drain => {
                if scan_only {
                    State::Done
                } else {
                    if file_node.is_none() {
                        file_node = db.get_file_to_scrub(skip_for)?;
                    }
                    match file_node.as_mut() {
                        None => State::Done,
                        Some(node) => {
                            let n = node.read(block_size)?;
                            stats.bytes_hashed += n as u64;
                            if n == 0 {
                                finish_node(&mut file_node, &mut stats);
                            }
                            if let Some(bucket) = read_limit.as_mut() {
                                let delay = bucket.charge(n as f64);
                                if !delay.is_zero() {
                                    debug!(
                                        "rate-limiting delay (read): {:.1}s",
                                        delay.as_secs_f64()
                                    );
                                    sleep(delay);
                                }
                            }
                            State::Drain
                        }
                    }
                }
            }

            State::Done => break,
        };
    }

    Ok(stats)
}

fn finish_node(file_node: &mut Option<FileNode<'_>>, stats: &mut ScrubStats) {
    if let Some(mut node) = file_node.take() {
        match node.outcome() {
            Some(ScrubOutcome::Skipped) => stats.skipped += 1,
            Some(ScrubOutcome::Clean) => stats.hashed += 1,
            Some(ScrubOutcome::Changed) => {
                stats.hashed += 1;
                stats.changed += 1;
            }
            Some(ScrubOutcome::Bitrot) => {
                stats.hashed += 1;
                stats.bitrot += 1;
            }
            None => {}
        }
        node.close();
    }
}
