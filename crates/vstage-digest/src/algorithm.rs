use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DigestError;

/// A named digest algorithm.
///
/// Algorithms are identified on disk by their registry id (`"sha512"`,
/// `"blake2b-512"`, ...), never by the Rust variant name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    Sha512,
    Sha256,
    Sha1,
    Md5,
    Blake2b160,
    Blake2b256,
    Blake2b384,
    Blake2b512,
    Blake3,
}

impl Algorithm {
    /// Every registered algorithm.
    pub const ALL: [Algorithm; 9] = [
        Algorithm::Sha512,
        Algorithm::Sha256,
        Algorithm::Sha1,
        Algorithm::Md5,
        Algorithm::Blake2b160,
        Algorithm::Blake2b256,
        Algorithm::Blake2b384,
        Algorithm::Blake2b512,
        Algorithm::Blake3,
    ];

    /// The registry id.
    pub const fn id(&self) -> &'static str {
        match self {
            Algorithm::Sha512 => "sha512",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha1 => "sha1",
            Algorithm::Md5 => "md5",
            Algorithm::Blake2b160 => "blake2b-160",
            Algorithm::Blake2b256 => "blake2b-256",
            Algorithm::Blake2b384 => "blake2b-384",
            Algorithm::Blake2b512 => "blake2b-512",
            Algorithm::Blake3 => "blake3",
        }
    }

    /// Look up an algorithm by registry id.
    pub fn from_id(id: &str) -> Result<Self, DigestError> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.id() == id)
            .ok_or_else(|| DigestError::AlgorithmUnknown(id.to_string()))
    }

    /// Digest length in bytes.
    pub const fn output_len(&self) -> usize {
        match self {
            Algorithm::Sha512 | Algorithm::Blake2b512 => 64,
            Algorithm::Blake2b384 => 48,
            Algorithm::Sha256 | Algorithm::Blake2b256 | Algorithm::Blake3 => 32,
            Algorithm::Sha1 | Algorithm::Blake2b160 => 20,
            Algorithm::Md5 => 16,
        }
    }
}

impl fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Algorithm({})", self.id())
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s)
    }
}

impl TryFrom<String> for Algorithm {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_id(&value)
    }
}

impl From<Algorithm> for String {
    fn from(alg: Algorithm) -> Self {
        alg.id().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip() {
        for alg in Algorithm::ALL {
            assert_eq!(Algorithm::from_id(alg.id()).unwrap(), alg);
        }
    }

    #[test]
    fn unknown_id() {
        assert_eq!(
            Algorithm::from_id("sha3-256"),
            Err(DigestError::AlgorithmUnknown("sha3-256".into()))
        );
    }

    #[test]
    fn serde_uses_registry_id() {
        let json = serde_json::to_string(&Algorithm::Blake2b512).unwrap();
        assert_eq!(json, "\"blake2b-512\"");
        let parsed: Algorithm = serde_json::from_str("\"sha256\"").unwrap();
        assert_eq!(parsed, Algorithm::Sha256);
        assert!(serde_json::from_str::<Algorithm>("\"crc32\"").is_err());
    }
}
