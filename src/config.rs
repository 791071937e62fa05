//! YAML configuration model and resolution.
//!
//! Configuration is read from one or more files passed with `-c/--config`;
//! later files deep-merge over earlier ones, mapping by mapping, so a small
//! override file only needs the keys it changes. The merged tree is
//! deserialized into [`Config`] and then resolved into validated runtime
//! settings: the core only ever consumes the resolved output.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use crate::discovery::PathFilter;
use crate::error::{Result, ScrubError};
use crate::hashing::ChecksumAlgo;
use crate::rate::TokenBucket;

/// Top-level configuration tree, mirroring the YAML layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub operation: OperationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root paths to scrub. A single scalar is accepted as well as a list.
    #[serde(deserialize_with = "path_or_paths")]
    pub path: Vec<PathBuf>,
    /// Skip subdirectories that live on a different device than their root.
    pub xdev: bool,
    /// Ordered `"+<regex>"` / `"-<regex>"` rules; first match wins.
    pub filter: Vec<String>,
    pub metadata: MetadataConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: Vec::new(),
            xdev: true,
            filter: Vec::new(),
            metadata: MetadataConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Path of the SQLite metadata database.
    pub db: Option<PathBuf>,
    /// Path of the sidecar digest; defaults to `db` + ".check".
    pub db_parity: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Content digest algorithm name.
    pub checksum: String,
    /// Bytes per read call while hashing.
    pub read_block: usize,
    /// Cooldown before retrying a file that mutated mid-read.
    pub skip_for_hours: f64,
    pub rate_limit: RateLimitConfig,
}

impl Default for OperationConfig {
    fn default() -> Self {
        OperationConfig {
            checksum: "sha256".to_string(),
            read_block: 4 << 20,
            skip_for_hours: 3.0,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Scan limiter spec (`"<interval>[:<burst>]"`); empty disables.
    pub scan: Option<String>,
    /// Read limiter spec, charged per byte; empty disables.
    pub read: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log every SQL statement at debug level.
    pub sql_queries: bool,
}

/// Resolved store parameters, enough to open the metadata database.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub db_path: PathBuf,
    pub parity_path: PathBuf,
    pub checksum: ChecksumAlgo,
    pub log_sql: bool,
}

/// Fully resolved scrub settings: what the engine consumes.
#[derive(Debug)]
pub struct Settings {
    pub roots: Vec<PathBuf>,
    pub xdev: bool,
    pub filter: PathFilter,
    pub store: StoreSettings,
    pub read_block: usize,
    /// Seconds of cooldown after a mid-read mutation.
    pub skip_for: f64,
    pub scan_limit: Option<TokenBucket>,
    pub read_limit: Option<TokenBucket>,
}

impl Config {
    /// Loads and deep-merges the given configuration files in order.
    pub fn load(paths: &[PathBuf]) -> Result<Config> {
        let mut merged = Value::Null;
        for path in paths {
            let text = fs::read_to_string(path).map_err(|source| ScrubError::io(path, source))?;
            let value: Value =
                serde_yaml::from_str(&text).map_err(|source| ScrubError::ConfigParse {
                    path: path.clone(),
                    source,
                })?;
            merged = merge_values(merged, value);
        }
        if merged.is_null() {
            return Ok(Config::default());
        }
        serde_yaml::from_value(merged).map_err(|err| ScrubError::Config {
            message: format!("invalid configuration: {err}"),
        })
    }

    /// Resolves the store-related subset, used by every subcommand.
    pub fn resolve_store(&self) -> Result<StoreSettings> {
        let db_path = self
            .storage
            .metadata
            .db
            .clone()
            .ok_or_else(|| ScrubError::Config {
                message: "storage.metadata.db is required".to_string(),
            })?;
        let parity_path = match &self.storage.metadata.db_parity {
            Some(path) => path.clone(),
            None => {
                let mut os: OsString = db_path.clone().into_os_string();
                os.push(".check");
                PathBuf::from(os)
            }
        };
        let checksum: ChecksumAlgo = self.operation.checksum.parse()?;
        Ok(StoreSettings {
            db_path,
            parity_path,
            checksum,
            log_sql: self.logging.sql_queries,
        })
    }

    /// Resolves the complete scrub settings, appending `extra_paths` to the
    /// configured roots.
    pub fn resolve(&self, extra_paths: &[PathBuf]) -> Result<Settings> {
        let store = self.resolve_store()?;

        let mut roots = self.storage.path.clone();
        roots.extend(extra_paths.iter().cloned());
        if roots.is_empty() {
            return Err(ScrubError::Config {
                message: "storage.path must name at least one root".to_string(),
            });
        }

        if self.operation.read_block == 0 {
            return Err(ScrubError::Config {
                message: "operation.read_block must be positive".to_string(),
            });
        }

        let filter = PathFilter::parse(&self.storage.filter)?;
        let scan_limit = parse_limit("scan", &self.operation.rate_limit.scan)?;
        let read_limit = parse_limit("read", &self.operation.rate_limit.read)?;

        Ok(Settings {
            roots,
            xdev: self.storage.xdev,
            filter,
            store,
            read_block: self.operation.read_block,
            skip_for: self.operation.skip_for_hours * 3600.0,
            scan_limit,
            read_limit,
        })
    }
}

fn parse_limit(metric: &str, spec: &Option<String>) -> Result<Option<TokenBucket>> {
    match spec.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(spec) => TokenBucket::from_spec(metric, spec).map(Some),
    }
}

/// Deep merge: mappings merge key-wise, anything else is replaced. A null
/// override is a no-op, so an empty or comment-only file changes nothing.
fn merge_values(base: Value, over: Value) -> Value {
    match (base, over) {
        (base, Value::Null) => base,
        (Value::Mapping(mut base), Value::Mapping(over)) => {
            for (key, value) in over {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Mapping(base)
        }
        (_, over) => over,
    }
}

fn path_or_paths<'de, D>(deserializer: D) -> std::result::Result<Vec<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(PathBuf),
        Many(Vec<PathBuf>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}
