//! # scour CLI
//!
//! Checks the integrity of at-rest files: walks the configured roots,
//! refreshes per-file metadata records, and re-hashes file contents under
//! configurable rate limits. A checksum change that the file's metadata
//! cannot explain is reported as bitrot.
//!
//! ## Commands
//!
//! - **scrub**: run a full pass (scan metadata + hash candidates)
//! - **status**: list recorded paths and their scrub state
//!
//! ## Quick Start
//!
//! ```bash
//! scour -c /etc/scour.yaml scrub
//! scour -c /etc/scour.yaml status -v
//! ```
//!
//! Exit code is 0 on success and non-zero on configuration errors or when
//! the metadata database fails its integrity check.

use scour::cli::Cli;

fn main() -> miette::Result<()> {
    miette::set_panic_hook();

    let cli = Cli::parse_args();
    scour::commands::execute(&cli).map_err(Into::into)
}
