//! Digest algorithm selection.
//!
//! Algorithm names come from configuration (`hashing_algorithm`). Matching is
//! case-insensitive and ignores `-`/`_`, so `SHA-256`, `sha256` and
//! `Sha_256` all select SHA-256.

use std::fmt;

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512, Sha512_256};

use ledger_contracts::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_256,
}

impl DigestAlgorithm {
    /// Resolve a configured algorithm name.
    ///
    /// Returns `LedgerError::Config` for names this engine cannot compute.
    pub fn from_name(name: &str) -> LedgerResult<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "SHA224" => Ok(Self::Sha224),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            "SHA512/256" => Ok(Self::Sha512_256),
            _ => Err(LedgerError::config(format!(
                "unsupported hashing algorithm: {}",
                name
            ))),
        }
    }

    /// Digest `bytes` and hex-encode the result (lower case, no separators).
    pub fn hex_digest(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha224 => hex::encode(Sha224::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha384 => hex::encode(Sha384::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
            Self::Sha512_256 => hex::encode(Sha512_256::digest(bytes)),
        }
    }

    /// Length of the hex digest in characters.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha224 => 56,
            Self::Sha256 | Self::Sha512_256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
            Self::Sha512_256 => "SHA-512/256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
