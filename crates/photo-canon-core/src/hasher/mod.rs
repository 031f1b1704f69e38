pub mod parallel;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub use parallel::hash_records;

/// Bytes read per call while streaming a file through the hasher.
pub const READ_CHUNK_LENGTH: usize = 1024 * 1024; // 1MB

/// Hex length of a BLAKE3 digest.
pub const FINGERPRINT_HEX_LENGTH: usize = 64;

/// Content identity of a file: the lowercase hex BLAKE3 digest of its bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Accepts exactly 64 lowercase hex characters.
    pub fn parse(hex: &str) -> Option<Self> {
        let valid = hex.len() == FINGERPRINT_HEX_LENGTH
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Fingerprint(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..10]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fingerprint::parse(value.trim()).ok_or_else(|| format!("invalid fingerprint '{}'", value))
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Fingerprint(hash.to_hex().to_string())
    }
}

/// Stream `reader` to the end in bounded chunks and return its fingerprint.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_CHUNK_LENGTH];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize().into())
}

pub fn hash_file(path: &Path) -> io::Result<Fingerprint> {
    let file = File::open(path)?;
    hash_reader(file)
}

pub fn hash_bytes(data: &[u8]) -> Fingerprint {
    blake3::hash(data).into()
}
