//! Implementation of scour subcommands.

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::error::Result;
use crate::logging;

pub mod scrub;
pub mod status;

/// Execute the subcommand selected by the parsed CLI arguments.
pub fn execute(cli: &Cli) -> Result<()> {
    logging::init(cli.debug());

    let config = Config::load(cli.configs())?;

    match cli.command() {
        Commands::Scrub {
            scan_only,
            extra_paths,
        } => scrub::run(&config, extra_paths, *scan_only),
        Commands::Status {
            verbose,
            dirty,
            checked,
            not_checked,
        } => status::run(
            &config,
            status::StatusFlags {
                verbose: *verbose,
                dirty: *dirty,
                checked: *checked,
                not_checked: *not_checked,
            },
        ),
    }
}
