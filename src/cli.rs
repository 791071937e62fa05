//! Command-line interface definitions for scour.
//!
//! This module defines the CLI structure using clap: global options shared by
//! every subcommand plus the `scrub` and `status` subcommands themselves.
//!
//! # Example
//!
//! ```no_run
//! use scour::cli::{Cli, Commands};
//!
//! let cli = Cli::parse_args();
//! match cli.command() {
//!     Commands::Scrub { scan_only, .. } => println!("scrubbing (scan only: {scan_only})"),
//!     Commands::Status { .. } => println!("listing status"),
//! }
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Main command-line interface for scour.
#[derive(Debug, Parser)]
#[command(
    name = "scour",
    author,
    version,
    about = "Check integrity of at-rest files",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration files to process. Can be specified more than once;
    /// values from later files override values from earlier ones
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,

    /// Verbose operation mode
    #[arg(long, env = "SCOUR_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The configuration files, in the order given.
    pub fn configs(&self) -> &[PathBuf] {
        &self.config
    }

    /// Whether `--debug` was requested.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// The subcommand to execute.
    pub fn command(&self) -> &Commands {
        &self.command
    }
}

/// Available scour subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk the configured roots, refresh metadata and hash candidate files
    ///
    /// Every regular file under `storage.path` has its metadata compared
    /// against the store; files whose contents need (re)verification are
    /// then streamed through the configured checksum, under the configured
    /// scan/read rate limits. A checksum mismatch without a matching
    /// metadata change is reported as bitrot.
    Scrub {
        /// Update metadata records only; skip all content hashing
        #[arg(long)]
        scan_only: bool,

        /// Additional root paths to scan besides storage.path
        #[arg(long, value_name = "PATH", num_args = 1..)]
        extra_paths: Vec<PathBuf>,
    },

    /// List recorded paths and their scrub state
    Status {
        /// Also show last-scrub and last-skip timestamps
        #[arg(short, long)]
        verbose: bool,

        /// Only list files whose metadata changed since their last checksum
        #[arg(short, long)]
        dirty: bool,

        /// Only list files whose checksum was verified this pass
        #[arg(short, long)]
        checked: bool,

        /// Only list files not yet verified this pass
        #[arg(short = 'u', long)]
        not_checked: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_parsing() {
        let cli = Cli::parse_from(["scour", "scrub"]);
        assert!(cli.configs().is_empty());
        assert!(!cli.debug());
        assert!(matches!(
            cli.command(),
            Commands::Scrub {
                scan_only: false,
                ..
            }
        ));
    }

    #[test]
    fn test_repeatable_config() {
        let cli = Cli::parse_from(["scour", "-c", "base.yaml", "-c", "site.yaml", "scrub"]);
        assert_eq!(
            cli.configs(),
            &[PathBuf::from("base.yaml"), PathBuf::from("site.yaml")]
        );
    }

    #[test]
    fn test_scan_only_and_extra_paths() {
        let cli = Cli::parse_from([
            "scour",
            "scrub",
            "--scan-only",
            "--extra-paths",
            "/mnt/a",
            "/mnt/b",
        ]);
        match cli.command() {
            Commands::Scrub {
                scan_only,
                extra_paths,
            } => {
                assert!(scan_only);
                assert_eq!(
                    extra_paths,
                    &[PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_status_flags() {
        let cli = Cli::parse_from(["scour", "status", "-v", "-d"]);
        match cli.command() {
            Commands::Status {
                verbose,
                dirty,
                checked,
                not_checked,
            } => {
                assert!(verbose);
                assert!(dirty);
                assert!(!checked);
                assert!(!not_checked);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["scour", "status", "--not-checked"]);
        assert!(matches!(
            cli.command(),
            Commands::Status {
                not_checked: true,
                ..
            }
        ));
    }

    #[test]
    fn test_debug_flag_positioning() {
        let cli = Cli::parse_from(["scour", "--debug", "status"]);
        assert!(cli.debug());
    }
}
