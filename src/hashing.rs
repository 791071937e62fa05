use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use digest::{Digest, DynDigest};

use crate::error::{Result, ScrubError};

/// Chunk size for streaming the database file through the sidecar digest.
const SIDECAR_CHUNK: usize = 1 << 20;

/// Content digest algorithms resolvable from `operation.checksum`.
///
/// The name is resolved once at startup; an unknown name is a fatal
/// configuration error. Each scrubbed file gets a fresh accumulator from
/// [`ChecksumAlgo::new_digest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl ChecksumAlgo {
    /// The canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgo::Md5 => "md5",
            ChecksumAlgo::Sha1 => "sha1",
            ChecksumAlgo::Sha224 => "sha224",
            ChecksumAlgo::Sha256 => "sha256",
            ChecksumAlgo::Sha384 => "sha384",
            ChecksumAlgo::Sha512 => "sha512",
            ChecksumAlgo::Blake3 => "blake3",
        }
    }

    /// Creates a fresh streaming accumulator for this algorithm.
    pub fn new_digest(&self) -> Box<dyn DynDigest> {
        match self {
            ChecksumAlgo::Md5 => Box::new(md5::Md5::new()),
            ChecksumAlgo::Sha1 => Box::new(sha1::Sha1::new()),
            ChecksumAlgo::Sha224 => Box::new(sha2::Sha224::new()),
            ChecksumAlgo::Sha256 => Box::new(sha2::Sha256::new()),
            ChecksumAlgo::Sha384 => Box::new(sha2::Sha384::new()),
            ChecksumAlgo::Sha512 => Box::new(sha2::Sha512::new()),
            ChecksumAlgo::Blake3 => Box::new(blake3::Hasher::new()),
        }
    }
}

impl FromStr for ChecksumAlgo {
    type Err = ScrubError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgo::Md5),
            "sha1" => Ok(ChecksumAlgo::Sha1),
            "sha224" => Ok(ChecksumAlgo::Sha224),
            "sha256" => Ok(ChecksumAlgo::Sha256),
            "sha384" => Ok(ChecksumAlgo::Sha384),
            "sha512" => Ok(ChecksumAlgo::Sha512),
            "blake3" => Ok(ChecksumAlgo::Blake3),
            _ => Err(ScrubError::UnknownChecksum(name.to_string())),
        }
    }
}

impl fmt::Display for ChecksumAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Computes the sidecar digest of a file: streaming BLAKE3, hex-encoded.
///
/// This algorithm is fixed and independent of the user-selected content
/// digest; the sidecar of a database scrubbed with md5 checksums is still
/// BLAKE3.
pub fn sidecar_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|source| ScrubError::io(path, source))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; SIDECAR_CHUNK];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ScrubError::io(path, source))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(blake3::Hasher::finalize(&hasher).to_hex().to_string())
}
