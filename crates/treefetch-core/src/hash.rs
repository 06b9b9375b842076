//! Typed content digests.
//!
//! Two algorithms are in play: SHA-1 for git commit identifiers (`rev`) and
//! SHA-256 for NAR hashes. Hashes print as base16 or as SRI
//! (`sha256-<base64>`); store path hash parts use the Nix base32 alphabet.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::error::{FetchError, Result};

/// Nix base32 alphabet (no `e`, `o`, `u`, `t`).
const BASE32_CHARS: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Digest algorithm of a [`Hash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Digest size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Hash {
    /// Wrap raw digest bytes. The length must match the algorithm.
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != algorithm.size() {
            return Err(FetchError::bad_hash(
                hex::encode(&bytes),
                format!(
                    "expected {} bytes for {}, got {}",
                    algorithm.size(),
                    algorithm,
                    bytes.len()
                ),
            ));
        }
        Ok(Self { algorithm, bytes })
    }

    /// SHA-256 of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            bytes: Sha256::digest(data).to_vec(),
        }
    }

    /// Parse base16 text for a known algorithm.
    pub fn parse_hex(text: &str, algorithm: HashAlgorithm) -> Result<Self> {
        if text.len() != algorithm.size() * 2 {
            return Err(FetchError::bad_hash(
                text,
                format!(
                    "a base16 {} hash must be {} characters",
                    algorithm,
                    algorithm.size() * 2
                ),
            ));
        }
        let bytes = hex::decode(text).map_err(|e| FetchError::bad_hash(text, e.to_string()))?;
        Self::from_bytes(algorithm, bytes)
    }

    /// Parse SRI text such as `sha256-<base64>`.
    pub fn parse_sri(text: &str) -> Result<Self> {
        let (algo, digest) = text
            .split_once('-')
            .ok_or_else(|| FetchError::bad_hash(text, "not an SRI hash"))?;
        let algorithm = HashAlgorithm::from_name(algo)
            .ok_or_else(|| FetchError::bad_hash(text, format!("unknown algorithm '{algo}'")))?;
        let bytes = BASE64
            .decode(digest)
            .map_err(|e| FetchError::bad_hash(text, e.to_string()))?;
        Self::from_bytes(algorithm, bytes)
    }

    /// Parse any supported text form: SRI, `<algo>:<base16>` or bare base16
    /// (algorithm inferred from the length).
    pub fn parse_any(text: &str) -> Result<Self> {
        if let Some((algo, digest)) = text.split_once(':') {
            let algorithm = HashAlgorithm::from_name(algo)
                .ok_or_else(|| FetchError::bad_hash(text, format!("unknown algorithm '{algo}'")))?;
            return Self::parse_hex(digest, algorithm);
        }
        if text.contains('-') {
            return Self::parse_sri(text);
        }
        let algorithm = HashAlgorithm::from_hex_len(text.len())
            .ok_or_else(|| FetchError::bad_hash(text, "cannot infer the hash algorithm"))?;
        Self::parse_hex(text, algorithm)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base16 form without an algorithm prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// SRI form, e.g. `sha256-47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=`.
    pub fn to_sri(&self) -> String {
        format!("{}-{}", self.algorithm, BASE64.encode(&self.bytes))
    }

    /// Commit identifier text, as git prints it.
    pub fn git_rev(&self) -> String {
        self.to_hex()
    }

    /// Fold the digest into `size` bytes by XOR.
    pub fn compress(&self, size: usize) -> Vec<u8> {
        let mut out = vec![0u8; size];
        for (i, byte) in self.bytes.iter().enumerate() {
            out[i % size] ^= byte;
        }
        out
    }
}

/// Encode bytes in Nix base32, last bit group first.
pub fn to_base32(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let len = (bytes.len() * 8 - 1) / 5 + 1;
    (0..len)
        .rev()
        .map(|n| {
            let bit = n * 5;
            let (i, j) = (bit / 8, bit % 8);
            let low = u32::from(bytes[i]) >> j;
            let high = bytes.get(i + 1).map_or(0, |b| u32::from(*b) << (8 - j));
            char::from(BASE32_CHARS[((low | high) & 0x1f) as usize])
        })
        .collect()
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sri())
    }
}
