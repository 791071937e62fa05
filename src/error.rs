//! Error types for scour.
//!
//! All fallible paths in the crate funnel into [`ScrubError`], defined with
//! `thiserror` and annotated with `miette` diagnostic codes so the CLI can
//! render rich reports.
//!
//! # Error Handling Strategy
//!
//! - Configuration problems (missing fields, unknown digest names, malformed
//!   rate specs, bad filter rules) are fatal at startup.
//! - A sidecar integrity mismatch is fatal at startup; the operator must
//!   investigate before the database is touched again.
//! - Per-file I/O trouble during a pass is not fatal: the walker logs and
//!   skips unreadable roots, and the store drops records whose files cannot
//!   be opened for hashing.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error types that can occur in scour operations.
#[derive(Error, Debug, Diagnostic)]
pub enum ScrubError {
    /// Required configuration is missing or inconsistent.
    ///
    /// Raised during option resolution when, for example, `storage.path` is
    /// empty or `storage.metadata.db` is absent.
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(scour::config::error),
        help("Check the configuration files passed with -c/--config.")
    )]
    Config {
        /// Description of what is missing or inconsistent
        message: String,
    },

    /// A configuration file could not be parsed as YAML.
    #[error("Failed to parse configuration file '{path}'")]
    #[diagnostic(code(scour::config::yaml))]
    ConfigParse {
        /// The configuration file that failed to parse
        path: PathBuf,
        /// The underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// A rate-limit spec did not match `"<interval>[:<burst>]"`.
    ///
    /// `<interval>` is either a float (seconds) or `<a>/<b>` (seconds per
    /// unit); both interval and burst must be non-negative.
    #[error("Invalid rate limit for metric '{metric}': {spec:?}")]
    #[diagnostic(
        code(scour::config::rate_spec),
        help("Use \"<interval>[:<burst>]\", e.g. \"0.1\", \"1/5\" or \"0.5:8\".")
    )]
    InvalidRateSpec {
        /// Which limiter the spec was for ("scan" or "read")
        metric: String,
        /// The offending spec string
        spec: String,
    },

    /// `operation.checksum` named a digest this build does not provide.
    #[error("Unknown checksum algorithm: '{0}'")]
    #[diagnostic(
        code(scour::config::unknown_checksum),
        help("Supported algorithms: md5, sha1, sha224, sha256, sha384, sha512, blake3.")
    )]
    UnknownChecksum(String),

    /// A `storage.filter` entry was malformed.
    ///
    /// Entries must start with `+` (accept) or `-` (reject) followed by a
    /// valid regular expression.
    #[error("Invalid filter rule {rule:?}: {message}")]
    #[diagnostic(code(scour::config::filter_rule))]
    InvalidFilterRule {
        /// The offending rule string
        rule: String,
        /// Why it was rejected
        message: String,
    },

    /// The sidecar digest does not match the database file.
    ///
    /// The database was modified (or corrupted) outside of a clean
    /// open/close cycle. scour refuses to trust it.
    #[error("Integrity check failed for '{db}' against '{parity}'")]
    #[diagnostic(
        code(scour::store::integrity),
        help(
            "The metadata database does not match its sidecar digest. Investigate before \
             deleting either file; removing the sidecar accepts the database as-is."
        )
    )]
    IntegrityCheckFailed {
        /// The database file
        db: PathBuf,
        /// The sidecar digest file
        parity: PathBuf,
    },

    /// File system I/O error.
    #[error("I/O error accessing '{path}'")]
    #[diagnostic(code(scour::io_error))]
    Io {
        /// The path that caused the I/O error
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An SQLite operation on the metadata store failed.
    #[error("Metadata store error")]
    #[diagnostic(code(scour::store::query))]
    Db(#[from] rusqlite::Error),
}

impl ScrubError {
    /// Shorthand for wrapping an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScrubError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, ScrubError>;
