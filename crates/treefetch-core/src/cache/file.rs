//! Cache persisted as a JSON file.
//!
//! Every operation first merges the file's current contents over the
//! in-memory copy, so entries written by other handles or processes are
//! seen by lookups and survive our writes. Writes land atomically
//! (tmp + rename); racing writers lose at most their own update, never the
//! file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cache, CacheEntry, accept_write};
use crate::attrs::{Attrs, attrs_to_json};
use crate::error::Result;
use crate::store::StorePath;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheRecord {
    key: Attrs,
    info: Attrs,
    store_path: String,
    immutable: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFileContents {
    version: u32,
    #[serde(default)]
    entries: Vec<CacheRecord>,
}

/// A [`Cache`] stored in a single JSON file.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, (Attrs, CacheEntry)>>,
}

impl FileCache {
    /// Open the cache file at `path`. A missing file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = Self::load(&path)?;
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> anyhow::Result<HashMap<String, (Attrs, CacheEntry)>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
        let contents: CacheFileContents = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;
        if contents.version != FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported cache file version {} in {}",
                contents.version,
                path.display()
            );
        }

        let mut entries = HashMap::new();
        for record in contents.entries {
            let store_path = match StorePath::from_base_name(&record.store_path) {
                Ok(p) => p,
                Err(err) => {
                    tracing::warn!("Skipping cache record with bad store path: {}", err);
                    continue;
                }
            };
            let entry = CacheEntry {
                info_attrs: record.info,
                store_path,
                immutable: record.immutable,
                timestamp: record.timestamp,
            };
            entries.insert(attrs_to_json(&record.key), (record.key, entry));
        }
        Ok(entries)
    }

    /// Merge the file's current contents over `entries`; the file wins.
    fn refresh(&self, entries: &mut HashMap<String, (Attrs, CacheEntry)>) -> anyhow::Result<()> {
        entries.extend(Self::load(&self.path)?);
        Ok(())
    }

    fn save(&self, entries: &HashMap<String, (Attrs, CacheEntry)>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let mut records: Vec<CacheRecord> = entries
            .values()
            .map(|(key, entry)| CacheRecord {
                key: key.clone(),
                info: entry.info_attrs.clone(),
                store_path: entry.store_path.to_string(),
                immutable: entry.immutable,
                timestamp: entry.timestamp,
            })
            .collect();
        records.sort_by(|a, b| attrs_to_json(&a.key).cmp(&attrs_to_json(&b.key)));

        let contents = CacheFileContents {
            version: FORMAT_VERSION,
            entries: records,
        };
        let bytes = serde_json::to_vec_pretty(&contents).context("Failed to serialize cache")?;
        let tmp_path = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp cache file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to rename tmp cache file: {}", tmp_path.display()))?;
        Ok(())
    }
}

impl Cache for FileCache {
    fn add(
        &self,
        in_attrs: &Attrs,
        info_attrs: &Attrs,
        store_path: &StorePath,
        immutable: bool,
    ) -> Result<()> {
        let key = attrs_to_json(in_attrs);
        let entry = CacheEntry::new(info_attrs, store_path, immutable);

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Cache lock poisoned"))?;
        self.refresh(&mut entries)?;

        if accept_write(&key, entries.get(&key).map(|(_, e)| e), &entry) {
            entries.insert(key, (in_attrs.clone(), entry));
            self.save(&entries)?;
        }
        Ok(())
    }

    fn lookup_entry(&self, in_attrs: &Attrs) -> Result<Option<CacheEntry>> {
        let key = attrs_to_json(in_attrs);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Cache lock poisoned"))?;
        self.refresh(&mut entries)?;
        Ok(entries.get(&key).map(|(_, e)| e.clone()))
    }
}
