use std::fs::File;
use std::io::Read;
use std::path::Path;

use digest::DynDigest;
use log::{debug, error, info};

use crate::error::{Result, ScrubError};
use crate::store::{FileRecord, MetaDb};
use crate::timestamp::StatSnapshot;

/// How a scrub of one file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubOutcome {
    /// Checksum recorded for the first time, or verified unchanged.
    Clean,
    /// Checksum changed together with the file's metadata: an ordinary edit.
    Changed,
    /// Checksum changed while size, mtime and ctime stayed put.
    Bitrot,
    /// Abandoned because the file mutated while it was being hashed.
    Skipped,
}

/// A file in the middle of being scrubbed.
///
/// Holds the open handle, the stored record it is checked against, a stat
/// snapshot taken when the handle was opened, and the running digest. Reads
/// are driven from outside in `block_size` chunks so the scheduler can
/// interleave them with scanning; the node persists its own terminal state.
pub struct FileNode<'db> {
    db: &'db MetaDb,
    src: Option<File>,
    record: FileRecord,
    src_meta: StatSnapshot,
    digest: Box<dyn DynDigest>,
    buf: Vec<u8>,
    outcome: Option<ScrubOutcome>,
}

impl<'db> FileNode<'db> {
    pub(crate) fn new(db: &'db MetaDb, src: File, record: FileRecord) -> Result<FileNode<'db>> {
        debug!("checking file: {}", record.path.display());
        let meta = src
            .metadata()
            .map_err(|source| ScrubError::io(&record.path, source))?;
        Ok(FileNode {
            db,
            src_meta: StatSnapshot::from(&meta),
            digest: db.algo().new_digest(),
            src: Some(src),
            record,
            buf: Vec::new(),
            outcome: None,
        })
    }

    /// The path being scrubbed.
    pub fn path(&self) -> &Path {
        &self.record.path
    }

    /// Terminal state, once the node has finished.
    pub fn outcome(&self) -> Option<ScrubOutcome> {
        self.outcome
    }

    /// Feeds up to `block_size` bytes into the digest and returns how many
    /// were consumed; 0 signals that this node is finished.
    ///
    /// After every read the handle is re-stat'd against the snapshot taken at
    /// open. A change means the file is being written while we hash it: the
    /// partial digest is worthless, so the record is flagged dirty with a
    /// fresh skip timestamp and the node ends. At end of file the digest is
    /// finalized, compared against the stored checksum, and the result
    /// persisted.
    pub fn read(&mut self, block_size: usize) -> Result<usize> {
        if self.outcome.is_some() {
            return Ok(0);
        }
        let src = match self.src.as_mut() {
            Some(src) => src,
            None => return Ok(0),
        };

        if self.buf.len() != block_size {
            self.buf.resize(block_size, 0);
        }
        let n = src
            .read(&mut self.buf)
            .map_err(|source| ScrubError::io(&self.record.path, source))?;

        let meta = src
            .metadata()
            .map_err(|source| ScrubError::io(&self.record.path, source))?;
        if StatSnapshot::from(&meta) != self.src_meta {
            self.db.mark_skip(&self.record.path)?;
            self.outcome = Some(ScrubOutcome::Skipped);
            return Ok(0);
        }

        if n > 0 {
            self.digest.update(&self.buf[..n]);
            return Ok(n);
        }

        let digest = self.digest.finalize_reset().into_vec();
        let outcome = self.classify(&digest);
        self.db
            .store_scrub_result(&self.record.path, &self.src_meta, &digest)?;
        self.outcome = Some(outcome);
        Ok(0)
    }

    /// Decides what a finished digest means for this record.
    fn classify(&self, digest: &[u8]) -> ScrubOutcome {
        match &self.record.checksum {
            Some(stored) if stored.as_slice() != digest => {
                // An intentional edit can still revert the mtime; ctime is
                // the harder-to-fake witness.
                let delta_ctime = (self.record.ctime - self.src_meta.ctime).abs();
                let delta_mtime = (self.record.mtime - self.src_meta.mtime).abs();
                if delta_ctime.max(delta_mtime) >= 1.0 {
                    info!(
                        "Detected change in file contents and ctime: {}",
                        self.record.path.display()
                    );
                    ScrubOutcome::Changed
                } else {
                    error!("Detected unmarked changes: {}", self.record.path.display());
                    ScrubOutcome::Bitrot
                }
            }
            _ => ScrubOutcome::Clean,
        }
    }

    /// Releases the file handle. Idempotent.
    pub fn close(&mut self) {
        if let Some(src) = self.src.take() {
            bufcache_dontneed(&src);
        }
        self.buf = Vec::new();
    }
}

impl Drop for FileNode<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Advises the kernel to drop this file's pages from the cache, so bulk
/// scrubbing does not evict data anyone is actually using.
#[cfg(target_os = "linux")]
fn bufcache_dontneed(src: &File) {
    use std::os::unix::io::AsRawFd;

    let _ = unsafe { libc::posix_fadvise(src.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED) };
}

#[cfg(not(target_os = "linux"))]
fn bufcache_dontneed(_src: &File) {}
