//! In-process cache.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;

use super::{Cache, CacheEntry, accept_write};
use crate::attrs::{Attrs, attrs_to_json};
use crate::error::Result;
use crate::store::StorePath;

/// Cache that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
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
            .write()
            .map_err(|_| anyhow!("Cache lock poisoned"))?;
        if accept_write(&key, entries.get(&key), &entry) {
            entries.insert(key, entry);
        }
        Ok(())
    }

    fn lookup_entry(&self, in_attrs: &Attrs) -> Result<Option<CacheEntry>> {
        let key = attrs_to_json(in_attrs);
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("Cache lock poisoned"))?;
        Ok(entries.get(&key).cloned())
    }
}
