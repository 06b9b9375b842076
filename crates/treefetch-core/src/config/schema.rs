//! Settings schema for treefetch.toml
//!
//! ```toml
//! github-access-token = "ghp_..."
//! tarball-ttl = 3600
//! store-dir = "/var/lib/treefetch/store"
//! cache-dir = "/var/cache/treefetch"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths;

/// Default revalidation period for mutable lookups, in seconds.
pub const DEFAULT_TARBALL_TTL: u64 = 60 * 60;

/// Process configuration consumed by the fetchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Token for private repositories and rate-limit relief
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_access_token: Option<String>,

    /// Seconds a resolved branch head stays fresh
    #[serde(default = "default_tarball_ttl")]
    pub tarball_ttl: u64,

    /// Store root (defaults to the data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,

    /// Fetcher cache and download cache root (defaults to the cache directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

fn default_tarball_ttl() -> u64 {
    DEFAULT_TARBALL_TTL
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_access_token: None,
            tarball_ttl: DEFAULT_TARBALL_TTL,
            store_dir: None,
            cache_dir: None,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tarball_ttl(&self) -> Duration {
        Duration::from_secs(self.tarball_ttl)
    }

    /// Access token, if one is configured and non-empty.
    pub fn github_access_token(&self) -> Option<&str> {
        self.github_access_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }

    pub fn store_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.store_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_store_dir(),
        }
    }

    pub fn cache_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_cache_dir(),
        }
    }

    /// Apply `TREEFETCH_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `TREEFETCH_*` overrides from `lookup`.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(token) = lookup("TREEFETCH_GITHUB_TOKEN") {
            self.github_access_token = Some(token);
        }
        if let Some(ttl) = lookup("TREEFETCH_TARBALL_TTL") {
            self.tarball_ttl = ttl
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid TREEFETCH_TARBALL_TTL '{}': {}", ttl, e))?;
        }
        if let Some(dir) = lookup("TREEFETCH_STORE_DIR") {
            self.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("TREEFETCH_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }
}
