//! # scour
//!
//! A filesystem scrubber that detects silent bit rot: content changes in
//! supposedly at-rest files that carry no matching metadata change.
//!
//! ## Overview
//!
//! scour periodically rescans every regular file under a configured set of
//! roots, streams each candidate through a cryptographic digest, and compares
//! the result against the checksum recorded when the file's size, mtime and
//! ctime last looked unchanged. A digest mismatch that the metadata cannot
//! explain is storage-layer corruption and is reported at error severity; a
//! mismatch accompanied by a metadata change is an ordinary edit and the new
//! checksum is adopted quietly.
//!
//! ## Key Features
//!
//! - **Metadata-gated verification**: size/mtime/ctime decide whether a
//!   changed digest is an edit or bitrot
//! - **Dual rate limiting**: independent token buckets for directory
//!   scanning and bulk content reads, interleaved by nearest deadline
//! - **Mid-read mutation detection**: files written while being hashed are
//!   skipped and retried after a cooldown
//! - **Self-checking store**: the SQLite metadata database carries a sidecar
//!   digest that is verified on every startup
//! - **Generation sweeps**: records for paths that vanished are dropped at
//!   the end of each pass
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`]: Command-line interface definitions using clap
//! - [`commands`]: Implementation of the `scrub` and `status` subcommands
//! - [`config`]: YAML configuration loading, merging and resolution
//! - [`error`]: Error types and handling with thiserror + miette
//! - [`scrub`]: The scheduler interleaving scanning and hashing
//! - [`store`]: The SQLite metadata store and its integrity sidecar
//! - [`node`]: Per-file streaming digest computation
//! - [`discovery`]: Root traversal, path filters and cross-device policy
//! - [`rate`]: Token-bucket rate limiting
//! - [`hashing`]: Checksum algorithm registry
//!
//! Internal modules (not part of the public API):
//! - `logging`: env_logger setup
//! - `timestamp`: epoch-seconds helpers and stat snapshots
//!
//! ## Library Usage
//!
//! While scour is primarily a CLI tool, the engine is usable directly:
//!
//! ```no_run
//! use scour::discovery::PathFilter;
//! use scour::hashing::ChecksumAlgo;
//! use scour::scrub::{self, ScrubOptions};
//! use scour::store::MetaDb;
//!
//! # fn main() -> scour::error::Result<()> {
//! let db = MetaDb::open(
//!     "/var/lib/scour/meta.db".as_ref(),
//!     "/var/lib/scour/meta.db.check".as_ref(),
//!     ChecksumAlgo::Sha256,
//!     false,
//! )?;
//! let stats = scrub::run(
//!     &db,
//!     ScrubOptions {
//!         roots: vec!["/srv/archive".into()],
//!         xdev: true,
//!         filter: PathFilter::empty(),
//!         skip_for: 3.0 * 3600.0,
//!         block_size: 4 << 20,
//!         scan_limit: None,
//!         read_limit: None,
//!         scan_only: false,
//!     },
//! )?;
//! println!("bitrot detections: {}", stats.bitrot);
//! db.close()?;
//! # Ok(())
//! # }
//! ```

// Re-export public modules for library usage
pub mod cli;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hashing;
pub mod node;
pub mod rate;
pub mod scrub;
pub mod store;

// Internal modules
mod logging;
mod timestamp;
