//! Content digests (`<algorithm>:<hex>`).

use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::error::{Result, SignError};

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded hash.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    fn hash(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha384 => hex::encode(Sha384::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(SignError::InvalidArgument(format!(
                "unsupported digest algorithm '{}'",
                other
            ))),
        }
    }
}

/// A validated content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Digest {
    /// Parse and validate a digest string such as `sha256:abc...`.
    ///
    /// The hex part must be lowercase and have the length of the algorithm.
    pub fn parse(s: &str) -> Result<Self> {
        let (algorithm, hex) = s.split_once(':').ok_or_else(|| {
            SignError::InvalidArgument(format!("invalid digest '{}': expected algorithm:hex", s))
        })?;
        let algorithm: DigestAlgorithm = algorithm.parse()?;

        if hex.len() != algorithm.hex_len() {
            return Err(SignError::InvalidArgument(format!(
                "invalid digest '{}': {} requires {} hex characters, got {}",
                s,
                algorithm.as_str(),
                algorithm.hex_len(),
                hex.len()
            )));
        }
        if !hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(SignError::InvalidArgument(format!(
                "invalid digest '{}': hex must be lowercase [0-9a-f]",
                s
            )));
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// Whether `s` is a well-formed digest.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// SHA-256 digest of `data`.
    pub fn sha256_of(data: &[u8]) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            hex: DigestAlgorithm::Sha256.hash(data),
        }
    }

    /// Whether `data` hashes to this digest.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.algorithm.hash(data) == self.hex
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

impl std::str::FromStr for Digest {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = SignError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}
