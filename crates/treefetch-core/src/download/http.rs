//! HTTP downloader with an on-disk download cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use serde::{Deserialize, Serialize};

use super::unpack::unpack_tarball;
use super::{CachedDownloadRequest, CachedDownloadResult, Downloader};
use crate::error::{FetchError, Result};
use crate::store::Store;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = concat!("treefetch/", env!("CARGO_PKG_VERSION"));

/// What we remember about a previous download of a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRecord {
    url: String,
    etag: Option<String>,
    last_checked: DateTime<Utc>,
    /// Base name of the store path for unpacked downloads.
    store_path: Option<String>,
    /// Body location for plain downloads.
    file: Option<PathBuf>,
    last_modified: Option<i64>,
}

/// Blocking [`Downloader`] backed by `reqwest`.
///
/// Metadata for each request lives in `<cache_dir>/downloads/<key>.json`,
/// plain bodies in `<cache_dir>/downloads/<key>.file`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    cache_dir: PathBuf,
    client: Client,
}

impl HttpDownloader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT_STRING)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            cache_dir: cache_dir.into(),
            client,
        })
    }

    fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.downloads_dir().join(format!("{key}.json"))
    }

    fn load_record(&self, key: &str) -> Option<DownloadRecord> {
        let path = self.record_path(key);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!("Ignoring unreadable download record {}: {}", path.display(), err);
                None
            }
        }
    }

    fn save_record(&self, key: &str, record: &DownloadRecord) -> anyhow::Result<()> {
        let dir = self.downloads_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create download cache: {}", dir.display()))?;
        let path = self.record_path(key);
        let tmp_path = dir.join(format!("{key}.json.{}.tmp", std::process::id()));
        let bytes =
            serde_json::to_vec_pretty(record).context("Failed to serialize download record")?;
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write download record: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to rename download record: {}", tmp_path.display()))?;
        Ok(())
    }

    /// Turn a record into a result if what it points at still exists.
    fn result_from_record(
        &self,
        store: &dyn Store,
        record: &DownloadRecord,
    ) -> Option<CachedDownloadResult> {
        let (path, store_path) = match (&record.store_path, &record.file) {
            (Some(text), _) => {
                let store_path = store.parse_store_path(text).ok()?;
                if !store.is_valid_path(&store_path) {
                    return None;
                }
                (store.to_real_path(&store_path), Some(store_path))
            }
            (None, Some(file)) if file.exists() => (file.clone(), None),
            _ => return None,
        };
        Some(CachedDownloadResult {
            path,
            store_path,
            last_modified: record.last_modified,
            etag: record.etag.clone(),
        })
    }

    fn fetch(
        &self,
        store: &dyn Store,
        request: &CachedDownloadRequest,
        key: &str,
        previous: Option<(&DownloadRecord, CachedDownloadResult)>,
    ) -> Result<CachedDownloadResult> {
        let url = request_url(request)?;
        tracing::info!("Downloading '{}'", request.url);

        let mut builder = self.client.get(url);
        if let Some(etag) = previous.as_ref().and_then(|(r, _)| r.etag.as_deref()) {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        let response = builder.send().map_err(client_error)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            if let Some((record, result)) = previous {
                tracing::debug!("'{}' not modified", request.url);
                let record = DownloadRecord {
                    last_checked: Utc::now(),
                    ..record.clone()
                };
                self.save_record(key, &record)?;
                return Ok(result);
            }
        }
        if !status.is_success() {
            return Err(FetchError::download(
                &request.url,
                format!("HTTP status {status}"),
            ));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (result, record) = if request.unpack {
            let staging_root = self.cache_dir.join("tmp");
            fs::create_dir_all(&staging_root)?;
            let staging = tempfile::tempdir_in(&staging_root)?;
            let unpacked =
                unpack_tarball(response, &staging.path().join("unpack")).map_err(|e| {
                    FetchError::download(&request.url, redact(request, format!("{e:#}")))
                })?;
            let store_path = store.add_path(&request.name, &unpacked.root)?;
            let last_modified = request.get_last_modified.then_some(unpacked.last_modified);
            (
                CachedDownloadResult {
                    path: store.to_real_path(&store_path),
                    store_path: Some(store_path.clone()),
                    last_modified,
                    etag: etag.clone(),
                },
                DownloadRecord {
                    url: request.url.clone(),
                    etag,
                    last_checked: Utc::now(),
                    store_path: Some(store_path.to_string()),
                    file: None,
                    last_modified,
                },
            )
        } else {
            let body = response.bytes().map_err(client_error)?;
            let file = self.downloads_dir().join(format!("{key}.file"));
            write_atomically(&file, &body)?;
            (
                CachedDownloadResult {
                    path: file.clone(),
                    store_path: None,
                    last_modified: None,
                    etag: etag.clone(),
                },
                DownloadRecord {
                    url: request.url.clone(),
                    etag,
                    last_checked: Utc::now(),
                    store_path: None,
                    file: Some(file),
                    last_modified: None,
                },
            )
        };

        self.save_record(key, &record)?;
        Ok(result)
    }
}

impl Downloader for HttpDownloader {
    fn download_cached(
        &self,
        store: &dyn Store,
        request: &CachedDownloadRequest,
    ) -> Result<CachedDownloadResult> {
        let key = cache_key(request);
        let record = self.load_record(&key);
        let previous = record
            .as_ref()
            .and_then(|r| self.result_from_record(store, r).map(|res| (r, res)));

        if let Some((record, result)) = &previous {
            if is_fresh(record.last_checked, request.ttl, Utc::now()) {
                tracing::debug!("Using cached download of '{}'", request.url);
                return Ok(result.clone());
            }
        }

        self.fetch(store, request, &key, previous)
    }
}

/// Download cache key. The access token is deliberately not part of it.
fn cache_key(request: &CachedDownloadRequest) -> String {
    let material = format!(
        "{}\0{}\0{}",
        request.url,
        if request.unpack { "unpack" } else { "file" },
        request.name
    );
    blake3::hash(material.as_bytes()).to_hex().to_string()
}

fn is_fresh(last_checked: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(last_checked);
    match age.to_std() {
        Ok(age) => age < ttl,
        // Checked in the future: clock skew, treat as fresh.
        Err(_) => true,
    }
}

fn request_url(request: &CachedDownloadRequest) -> Result<url::Url> {
    let mut url = url::Url::parse(&request.url)
        .map_err(|e| FetchError::BadUrl(format!("'{}': {}", request.url, e)))?;
    if let Some(token) = &request.access_token {
        url.query_pairs_mut().append_pair("access_token", token);
    }
    Ok(url)
}

/// Client errors carry the request URL, which may hold the access token.
fn client_error(err: reqwest::Error) -> FetchError {
    FetchError::Http(err.without_url())
}

fn redact(request: &CachedDownloadRequest, message: String) -> String {
    match &request.access_token {
        Some(token) => message.replace(token.as_str(), "<redacted>"),
        None => message,
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    fs::write(&tmp_path, data)
        .with_context(|| format!("Failed to write download: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename download: {}", tmp_path.display()))?;
    Ok(())
}
