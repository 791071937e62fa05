//! The metadata store: one SQLite file, one sidecar digest.
//!
//! The store keeps a row per scrubbed path plus a `meta` key/value table
//! holding the schema version. Opening verifies the sidecar digest of the
//! database file (written on the last clean close) and refuses to proceed on
//! a mismatch; closing rewrites it. The generation counter (one greater than
//! the highest stored generation) is fixed for the lifetime of the store and
//! lets a pass distinguish rows it has seen from stale leftovers.

use std::fs::{self, File};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Result, ScrubError};
use crate::hashing::{self, ChecksumAlgo};
use crate::node::FileNode;
use crate::timestamp::{StatSnapshot, unix_now};


/// Current schema version, stored under `meta.schema_version`.
pub const SCHEMA_VERSION: u32 = 1;

// clean - checksum was verified against content, nothing changed since
// dirty - size/mtime changed since the last recorded checksum
// last_scrub - last time clean was set
// last_skip - last time hashing was abandoned due to a mid-read change
const DB_INIT: &str = "
    CREATE TABLE IF NOT EXISTS files (
        path BLOB PRIMARY KEY ON CONFLICT REPLACE NOT NULL,
        generation INTEGER NOT NULL,
        size INTEGER NOT NULL,
        mtime REAL NOT NULL,
        ctime REAL NOT NULL,
        clean INTEGER NOT NULL,
        dirty INTEGER NOT NULL,
        checksum BLOB NULL,
        last_scrub REAL NULL,
        last_skip REAL NULL
    );
    CREATE INDEX IF NOT EXISTS files_checksum
        ON files (generation, checksum, last_skip, last_scrub);
    CREATE INDEX IF NOT EXISTS files_clean
        ON files (generation, clean, last_skip, last_scrub);
    CREATE INDEX IF NOT EXISTS files_dirty
        ON files (generation, dirty, last_skip, last_scrub);
    CREATE INDEX IF NOT EXISTS files_gen
        ON files (generation);

    CREATE TABLE IF NOT EXISTS meta (
        var TEXT PRIMARY KEY ON CONFLICT REPLACE NOT NULL,
        val TEXT NOT NULL
    );
";

/// Pending migration scripts, keyed by the version they migrate *to*.
const MIGRATIONS: &[(u32, &str)] = &[];

const COLUMNS: &str =
    "path, generation, size, mtime, ctime, clean, dirty, checksum, last_scrub, last_skip";

/// One row of the `files` table.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub generation: i64,
    pub size: u64,
    pub mtime: f64,
    pub ctime: f64,
    pub clean: bool,
    pub dirty: bool,
    pub checksum: Option<Vec<u8>>,
    pub last_scrub: Option<f64>,
    pub last_skip: Option<f64>,
}

impl FileRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
        let path: Vec<u8> = row.get(0)?;
        let size: i64 = row.get(2)?;
        Ok(FileRecord {
            path: PathBuf::from(std::ffi::OsString::from_vec(path)),
            generation: row.get(1)?,
            size: size as u64,
            mtime: row.get(3)?,
            ctime: row.get(4)?,
            clean: row.get(5)?,
            dirty: row.get(6)?,
            checksum: row.get(7)?,
            last_scrub: row.get(8)?,
            last_skip: row.get(9)?,
        })
    }
}

/// Durable per-file metadata, keyed by absolute path.
pub struct MetaDb {
    conn: Connection,
    db_path: PathBuf,
    parity_path: PathBuf,
    algo: ChecksumAlgo,
    generation: i64,
    log_sql: bool,
}

impl MetaDb {
    /// Opens (creating if needed) the store, after verifying the sidecar.
    pub fn open(
        db_path: &Path,
        parity_path: &Path,
        algo: ChecksumAlgo,
        log_sql: bool,
    ) -> Result<MetaDb> {
        verify_sidecar(db_path, parity_path)?;

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.execute_batch(DB_INIT)?;
        apply_migrations(&conn)?;

        let generation: i64 = conn
            .query_row("SELECT MAX(generation) FROM files", [], |row| {
                row.get::<_, Option<i64>>(0)
            })?
            .unwrap_or(0)
            + 1;

        Ok(MetaDb {
            conn,
            db_path: db_path.to_path_buf(),
            parity_path: parity_path.to_path_buf(),
            algo,
            generation,
            log_sql,
        })
    }

    /// The pass number assigned to this store instance. Constant until close.
    pub fn generation(&self) -> i64 {
        self.generation
    }

    pub(crate) fn algo(&self) -> ChecksumAlgo {
        self.algo
    }

    /// Closes the store and rewrites the sidecar digest.
    pub fn close(self) -> Result<()> {
        let MetaDb {
            conn,
            db_path,
            parity_path,
            ..
        } = self;
        conn.close().map_err(|(_, err)| ScrubError::Db(err))?;
        if db_path.exists() {
            let digest = hashing::sidecar_digest(&db_path)?;
            fs::write(&parity_path, format!("{digest}\n"))
                .map_err(|source| ScrubError::io(&parity_path, source))?;
        }
        Ok(())
    }

    /// Records the walker-observed metadata for `path` and returns whether
    /// the file is now considered dirty.
    ///
    /// A new path is inserted as neither clean nor dirty (it has no checksum
    /// yet). An existing record becomes dirty when its size changed or its
    /// mtime moved by more than one second; a bare ctime bump is tolerated by
    /// preserving the stored ctime, so that mid-read detection still has a
    /// reference point without flagging spurious changes.
    pub fn metadata_check(&self, path: &Path, size: u64, mtime: f64, ctime: f64) -> Result<bool> {
        let key = path.as_os_str().as_bytes();
        let row = self
            .conn
            .query_row(
                "SELECT size, mtime, ctime, dirty FROM files WHERE path = ?1 LIMIT 1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => {
                self.log_query("INSERT INTO files", path);
                self.conn.execute(
                    "INSERT INTO files (path, generation, size, mtime, ctime, clean, dirty)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                    params![key, self.generation, size as i64, mtime, ctime],
                )?;
                Ok(false)
            }
            Some((old_size, old_mtime, old_ctime, was_dirty)) => {
                let dirty =
                    was_dirty || old_size != size as i64 || (mtime - old_mtime).abs() > 1.0;
                let ctime = if dirty { ctime } else { old_ctime };
                self.log_query("UPDATE files (metadata_check)", path);
                self.conn.execute(
                    "UPDATE files SET generation = ?1, ctime = ?2, clean = 0, dirty = ?3
                     WHERE path = ?4",
                    params![self.generation, ctime, dirty, key],
                )?;
                Ok(dirty)
            }
        }
    }

    /// Deletes every record not observed during this pass.
    pub fn metadata_clean(&self) -> Result<()> {
        self.conn.execute(
            "DELETE FROM files WHERE generation < ?1",
            params![self.generation],
        )?;
        Ok(())
    }

    /// Selects the next file to hash and opens it.
    ///
    /// Candidates are rows of the current generation whose skip cooldown has
    /// lapsed, preferred in order: never hashed, dirty, not yet clean;
    /// least-recently-scrubbed rows go first. When all tiers come up empty the query
    /// runs once more with the cooldown horizon moved to `now - skip_for`.
    /// A candidate that cannot be opened is dropped and the next one tried.
    pub fn get_file_to_scrub(&self, skip_for: f64) -> Result<Option<FileNode<'_>>> {
        let mut skip_until = 0.0_f64;
        loop {
            let record = match self.next_candidate(skip_until)? {
                Some(record) => record,
                None => {
                    if skip_until == 0.0 {
                        skip_until = unix_now() - skip_for;
                        if skip_until != 0.0 {
                            continue;
                        }
                    }
                    return Ok(None);
                }
            };

            match File::open(&record.path) {
                Ok(src) => return Ok(Some(FileNode::new(self, src, record)?)),
                Err(err) => {
                    debug!(
                        "failed to open scanned path, skipping it: {} ({err})",
                        record.path.display()
                    );
                    self.drop_file(&record.path)?;
                }
            }
        }
    }

    fn next_candidate(&self, skip_until: f64) -> Result<Option<FileRecord>> {
        for tier in ["checksum IS NULL", "dirty = 1", "clean = 0"] {
            let sql = format!(
                "SELECT {COLUMNS} FROM files
                 WHERE generation = ?1 AND (last_skip IS NULL OR last_skip < ?2) AND {tier}
                 ORDER BY last_scrub LIMIT 1"
            );
            if self.log_sql {
                debug!("query: {sql}; params: [{}, {skip_until}]", self.generation);
            }
            let row = self
                .conn
                .query_row(&sql, params![self.generation, skip_until], FileRecord::from_row)
                .optional()?;
            if row.is_some() {
                return Ok(row);
            }
        }
        Ok(None)
    }

    /// Removes the record for `path` from the current generation.
    pub fn drop_file(&self, path: &Path) -> Result<()> {
        self.log_query("DELETE FROM files", path);
        self.conn.execute(
            "DELETE FROM files WHERE generation = ?1 AND path = ?2",
            params![self.generation, path.as_os_str().as_bytes()],
        )?;
        Ok(())
    }

    /// All records, ordered by path.
    pub fn list_paths(&self) -> Result<Vec<FileRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM files ORDER BY path");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], FileRecord::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// The record for `path`, if any.
    pub fn get_record(&self, path: &Path) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM files WHERE path = ?1 LIMIT 1");
        Ok(self
            .conn
            .query_row(&sql, params![path.as_os_str().as_bytes()], FileRecord::from_row)
            .optional()?)
    }

    /// Marks `path` as having mutated mid-read: dirty, with a fresh
    /// skip timestamp.
    pub(crate) fn mark_skip(&self, path: &Path) -> Result<()> {
        self.log_query("UPDATE files (skip)", path);
        self.conn.execute(
            "UPDATE files SET dirty = 1, last_skip = ?1 WHERE path = ?2",
            params![unix_now(), path.as_os_str().as_bytes()],
        )?;
        Ok(())
    }

    /// Persists a completed scrub: the record becomes clean with the
    /// metadata observed from the open handle, whatever `metadata_check`
    /// wrote earlier in the pass.
    pub(crate) fn store_scrub_result(
        &self,
        path: &Path,
        snapshot: &StatSnapshot,
        checksum: &[u8],
    ) -> Result<()> {
        self.log_query("UPDATE files (scrub result)", path);
        self.conn.execute(
            "UPDATE files SET dirty = 0, clean = 1,
                 size = ?1, mtime = ?2, ctime = ?3, checksum = ?4,
                 last_scrub = ?5, last_skip = NULL
             WHERE path = ?6",
            params![
                snapshot.size as i64,
                snapshot.mtime,
                snapshot.ctime,
                checksum,
                unix_now(),
                path.as_os_str().as_bytes()
            ],
        )?;
        Ok(())
    }

    fn log_query(&self, what: &str, path: &Path) {
        if self.log_sql {
            debug!("query: {what} for {}", path.display());
        }
    }
}

fn verify_sidecar(db_path: &Path, parity_path: &Path) -> Result<()> {
    if !parity_path.exists() {
        return Ok(());
    }
    let integrity_error = || ScrubError::IntegrityCheckFailed {
        db: db_path.to_path_buf(),
        parity: parity_path.to_path_buf(),
    };
    if !db_path.exists() {
        // A sidecar without its database is as suspect as a mismatch.
        return Err(integrity_error());
    }
    let expected =
        fs::read_to_string(parity_path).map_err(|source| ScrubError::io(parity_path, source))?;
    let actual = hashing::sidecar_digest(db_path)?;
    if expected.trim() != actual {
        return Err(integrity_error());
    }
    Ok(())
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT val FROM meta WHERE var = 'schema_version' LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let mut version: u32 = stored.and_then(|val| val.parse().ok()).unwrap_or(1);

    for (target, sql) in MIGRATIONS {
        if version < *target {
            conn.execute_batch(sql)?;
            version = *target;
        }
    }

    let version = version.max(SCHEMA_VERSION);
    conn.execute(
        "INSERT INTO meta (var, val) VALUES ('schema_version', ?1)",
        params![version.to_string()],
    )?;
    Ok(())
}
