//! Cached download capability.
//!
//! Fetchers describe what they want with a [`CachedDownloadRequest`]; the
//! [`Downloader`] decides whether a previous download is fresh enough to
//! reuse (TTL) and, for archives, unpacks the content into the store.

mod http;
mod unpack;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::store::{Store, StorePath};

pub use http::HttpDownloader;
pub use unpack::{UnpackedArchive, unpack_tarball};

/// TTL used for content addressed by an immutable hash; revalidation is
/// pointless for those.
pub const IMMUTABLE_TTL: Duration = Duration::from_secs(1_000_000_000);

/// A download that may be served from the download cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDownloadRequest {
    pub url: String,
    /// How long a previous download of `url` stays fresh.
    pub ttl: Duration,
    /// Unpack the body as a gzipped tarball and add it to the store.
    pub unpack: bool,
    /// Store path name of unpacked content.
    pub name: String,
    pub get_last_modified: bool,
    /// Sent as an `access_token` query parameter. Never persisted.
    pub access_token: Option<String>,
}

impl CachedDownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ttl: Duration::from_secs(3600),
            unpack: false,
            name: "source".to_string(),
            get_last_modified: false,
            access_token: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn unpacked(mut self, name: impl Into<String>) -> Self {
        self.unpack = true;
        self.name = name.into();
        self
    }

    pub fn with_last_modified(mut self) -> Self {
        self.get_last_modified = true;
        self
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }
}

/// Outcome of a cached download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDownloadResult {
    /// Local path of the body (a file, or the unpacked tree).
    pub path: PathBuf,
    /// Store path of unpacked content; `None` for plain files.
    pub store_path: Option<StorePath>,
    /// Unix seconds; only filled when requested.
    pub last_modified: Option<i64>,
    pub etag: Option<String>,
}

/// Downloads URLs through a TTL-governed cache.
pub trait Downloader: Send + Sync {
    fn download_cached(
        &self,
        store: &dyn Store,
        request: &CachedDownloadRequest,
    ) -> Result<CachedDownloadResult>;
}
