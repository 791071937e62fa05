//! Status command implementation.

use crate::config::Config;
use crate::error::Result;
use crate::store::{FileRecord, MetaDb};
use crate::timestamp::format_epoch;

/// Which subsets of the recorded paths to list.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFlags {
    pub verbose: bool,
    pub dirty: bool,
    pub checked: bool,
    pub not_checked: bool,
}

impl StatusFlags {
    fn selects(&self, record: &FileRecord) -> bool {
        if !self.dirty && !self.checked && !self.not_checked {
            return true;
        }
        (self.dirty && record.dirty)
            || (self.checked && record.clean)
            || (self.not_checked && !record.clean)
    }
}

/// Executes the status command: lists recorded paths, filtered by flags.
pub fn run(config: &Config, flags: StatusFlags) -> Result<()> {
    let store = config.resolve_store()?;
    let db = MetaDb::open(&store.db_path, &store.parity_path, store.checksum, store.log_sql)?;

    let records = db.list_paths()?;
    for record in records.iter().filter(|record| flags.selects(record)) {
        if flags.verbose {
            let state = if record.dirty {
                "dirty"
            } else if record.clean {
                "clean"
            } else {
                "unchecked"
            };
            let last_scrub = record
                .last_scrub
                .map(format_epoch)
                .unwrap_or_else(|| "never".to_string());
            let last_skip = record
                .last_skip
                .map(format_epoch)
                .unwrap_or_else(|| "-".to_string());
            let checksum = record
                .checksum
                .as_deref()
                .map(hex::encode)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{}\n  state: {state}  last-scrub: {last_scrub}  last-skip: {last_skip}  checksum: {checksum}",
                record.path.display()
            );
        } else {
            println!("{}", record.path.display());
        }
    }

    db.close()
}
