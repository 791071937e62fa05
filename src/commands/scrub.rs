//! Scrub command implementation.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::scrub::{self, ScrubOptions};
use crate::store::MetaDb;

/// Executes the scrub command: one full pass over the configured roots.
pub fn run(config: &Config, extra_paths: &[PathBuf], scan_only: bool) -> Result<()> {
    let settings = config.resolve(extra_paths)?;

    let db = MetaDb::open(
        &settings.store.db_path,
        &settings.store.parity_path,
        settings.store.checksum,
        settings.store.log_sql,
    )?;

    let result = scrub::run(
        &db,
        ScrubOptions {
            roots: settings.roots,
            xdev: settings.xdev,
            filter: settings.filter,
            skip_for: settings.skip_for,
            block_size: settings.read_block,
            scan_limit: settings.scan_limit,
            read_limit: settings.read_limit,
            scan_only,
        },
    );

    // The sidecar must be rewritten even after a failed pass; otherwise the
    // next startup refuses a database we know is fine.
    let closed = db.close();
    let stats = result?;
    closed?;

    eprintln!("Scrub pass complete:");
    eprintln!("  Files scanned: {}", stats.scanned);
    if !scan_only {
        eprintln!("  Files hashed: {}", stats.hashed);
        eprintln!("  Bytes hashed: {}", stats.bytes_hashed);
        if stats.skipped > 0 {
            eprintln!("  Skipped mid-read: {}", stats.skipped);
        }
        if stats.changed > 0 {
            eprintln!("  Changed files: {}", stats.changed);
        }
        if stats.bitrot > 0 {
            eprintln!("  BITROT detections: {}", stats.bitrot);
        }
    }

    Ok(())
}
