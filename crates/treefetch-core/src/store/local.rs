//! Directory-backed store.
//!
//! Layout:
//! - `<root>/<hash>-<name>` — store objects
//! - `<root>/.info/<hash>-<name>.json` — recorded [`PathInfo`]
//! - `<root>/.tmp/` — staging area for in-progress ingestion

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PathInfo, Store, StorePath};
use crate::error::{FetchError, Result};
use crate::fs::{copy_tree, hash_path};
use crate::hash::Hash;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathInfoRecord {
    nar_hash: String,
    nar_size: u64,
    registration_time: DateTime<Utc>,
}

/// A content-addressed store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (creating if necessary) a store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        for dir in [root.clone(), root.join(".info"), root.join(".tmp")] {
            fs::create_dir_all(&dir).with_context(|| {
                format!("Failed to create store directory: {}", dir.display())
            })?;
        }
        Ok(Self { root })
    }

    fn info_path(&self, path: &StorePath) -> PathBuf {
        self.root.join(".info").join(format!("{path}.json"))
    }

    fn staging_dir(&self) -> PathBuf {
        let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(".tmp")
            .join(format!("{}.{}", std::process::id(), n))
    }

    fn write_info(&self, path: &StorePath, info: &PathInfo) -> anyhow::Result<()> {
        let record = PathInfoRecord {
            nar_hash: info.nar_hash.to_sri(),
            nar_size: info.nar_size,
            registration_time: info.registration_time,
        };
        let info_path = self.info_path(path);
        let tmp_path = info_path.with_extension(format!("json.{}.tmp", std::process::id()));
        let bytes = serde_json::to_vec_pretty(&record).context("Failed to serialize path info")?;
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write path info: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &info_path)
            .with_context(|| format!("Failed to rename path info: {}", tmp_path.display()))?;
        Ok(())
    }
}

impl Store for LocalStore {
    fn store_dir(&self) -> &Path {
        &self.root
    }

    fn query_path_info(&self, path: &StorePath) -> Result<PathInfo> {
        let info_path = self.info_path(path);
        if !info_path.exists() {
            return Err(FetchError::InvalidPath(self.print_store_path(path)));
        }
        let bytes = fs::read(&info_path)?;
        let record: PathInfoRecord = serde_json::from_slice(&bytes)?;
        Ok(PathInfo {
            nar_hash: Hash::parse_sri(&record.nar_hash)?,
            nar_size: record.nar_size,
            registration_time: record.registration_time,
        })
    }

    fn is_valid_path(&self, path: &StorePath) -> bool {
        self.info_path(path).exists() && self.to_real_path(path).exists()
    }

    fn add_path(&self, name: &str, src: &Path) -> Result<StorePath> {
        let digest = hash_path(src)?;
        let store_path = self.make_fixed_output_path(&digest.hash, name);
        // Validates `name` before anything touches the filesystem.
        StorePath::from_base_name(&store_path.to_string())?;

        if self.is_valid_path(&store_path) {
            tracing::debug!("Store path {} already valid", store_path);
            return Ok(store_path);
        }

        let dest = self.to_real_path(&store_path);
        if !dest.exists() {
            let staging = self.staging_dir();
            copy_tree(src, &staging, false)?;
            if let Err(err) = fs::rename(&staging, &dest) {
                // Another writer may have won the race with identical content.
                let _ = fs::remove_dir_all(&staging);
                if !dest.exists() {
                    return Err(err.into());
                }
            }
        }

        self.write_info(
            &store_path,
            &PathInfo {
                nar_hash: digest.hash,
                nar_size: digest.size,
                registration_time: Utc::now(),
            },
        )?;
        tracing::debug!("Added {} to the store", store_path);
        Ok(store_path)
    }
}
