//! Content-addressed store contract.
//!
//! Fetchers only ever talk to a [`Store`] through this trait. [`LocalStore`]
//! is the directory-backed implementation used by the CLI and the tests.

mod local;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{FetchError, Result};
use crate::hash::{Hash, to_base32};

pub use local::LocalStore;

/// Length of the hash part of a store path base name.
pub const HASH_PART_LEN: usize = 32;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+\-._?=]+$").expect("valid regex"));

/// Identifier of an object in the store: `<hash part>-<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    hash_part: String,
    name: String,
}

impl StorePath {
    /// Parse a store path base name such as `0123…abcd-source`.
    pub fn from_base_name(base_name: &str) -> Result<Self> {
        let bad = || FetchError::BadStorePath(base_name.to_string());
        if base_name.len() < HASH_PART_LEN + 2 || !base_name.is_char_boundary(HASH_PART_LEN) {
            return Err(bad());
        }
        let (hash_part, rest) = base_name.split_at(HASH_PART_LEN);
        let name = rest.strip_prefix('-').ok_or_else(bad)?;
        if !hash_part
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
            || !NAME_REGEX.is_match(name)
        {
            return Err(bad());
        }
        Ok(Self {
            hash_part: hash_part.to_string(),
            name: name.to_string(),
        })
    }

    pub fn hash_part(&self) -> &str {
        &self.hash_part
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash_part, self.name)
    }
}

/// Metadata the store records for every valid path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub nar_hash: Hash,
    pub nar_size: u64,
    pub registration_time: DateTime<Utc>,
}

/// Capabilities a fetcher needs from a content-addressed store.
pub trait Store: Send + Sync {
    /// Directory that store paths are printed relative to.
    fn store_dir(&self) -> &Path;

    /// Location of a store path on the local filesystem.
    fn to_real_path(&self, path: &StorePath) -> PathBuf {
        self.store_dir().join(path.to_string())
    }

    /// Recorded metadata of a valid path.
    fn query_path_info(&self, path: &StorePath) -> Result<PathInfo>;

    fn is_valid_path(&self, path: &StorePath) -> bool;

    /// Ingest the tree at `src` under `name`, returning its store path.
    fn add_path(&self, name: &str, src: &Path) -> Result<StorePath>;

    /// Accepts either a full printed store path or a bare base name.
    fn parse_store_path(&self, text: &str) -> Result<StorePath> {
        let path = Path::new(text);
        let base_name = if path.is_absolute() {
            if path.parent() != Some(self.store_dir()) {
                return Err(FetchError::BadStorePath(text.to_string()));
            }
            path.file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| FetchError::BadStorePath(text.to_string()))?
        } else {
            text
        };
        StorePath::from_base_name(base_name)
    }

    fn print_store_path(&self, path: &StorePath) -> String {
        self.store_dir().join(path.to_string()).display().to_string()
    }

    /// Store path of a tree with the given NAR hash, independent of where the
    /// tree came from.
    ///
    /// The hash part is the Nix base32 form of
    /// `sha256("source:<algo>:<hex>:<store dir>:<name>")` folded to 20 bytes.
    fn make_fixed_output_path(&self, nar_hash: &Hash, name: &str) -> StorePath {
        let fingerprint = format!(
            "source:{}:{}:{}:{}",
            nar_hash.algorithm(),
            nar_hash.to_hex(),
            self.store_dir().display(),
            name
        );
        let digest = Hash::sha256(fingerprint.as_bytes());
        StorePath {
            hash_part: to_base32(&digest.compress(20)),
            name: name.to_string(),
        }
    }
}
