//! Fetch result cache.
//!
//! Maps the attributes of a request (`in_attrs`) to the attributes of what it
//! resolved to (`info_attrs`) plus the store path holding the content.
//!
//! Two namespaces share one cache:
//! - mutable entries, keyed by a moving pointer such as a branch name, which
//!   are overwritten freely
//! - immutable entries, keyed by a content hash, which are written once and
//!   never replaced with different content
//!
//! The cache itself never expires anything. Lookups hand back the entry's
//! timestamp and callers decide when a mutable entry is too old to trust
//! (see [`CacheEntry::is_expired`]).

mod file;
mod memory;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::attrs::Attrs;
use crate::error::Result;
use crate::store::StorePath;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Key/value storage for fetch results.
pub trait Cache: Send + Sync {
    /// Insert or update the entry for `in_attrs`.
    fn add(
        &self,
        in_attrs: &Attrs,
        info_attrs: &Attrs,
        store_path: &StorePath,
        immutable: bool,
    ) -> Result<()>;

    /// The most recent entry for `in_attrs`, if any.
    fn lookup_entry(&self, in_attrs: &Attrs) -> Result<Option<CacheEntry>>;

    /// Like [`Cache::lookup_entry`], without the bookkeeping fields.
    fn lookup(&self, in_attrs: &Attrs) -> Result<Option<(Attrs, StorePath)>> {
        Ok(self
            .lookup_entry(in_attrs)?
            .map(|entry| (entry.info_attrs, entry.store_path)))
    }
}

/// A stored fetch result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub info_attrs: Attrs,
    pub store_path: StorePath,
    pub immutable: bool,
    /// When the entry was last written.
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    fn new(info_attrs: &Attrs, store_path: &StorePath, immutable: bool) -> Self {
        Self {
            info_attrs: info_attrs.clone(),
            store_path: store_path.clone(),
            immutable,
            timestamp: Utc::now(),
        }
    }

    fn same_content(&self, other: &CacheEntry) -> bool {
        self.info_attrs == other.info_attrs && self.store_path == other.store_path
    }

    /// Whether a mutable entry is at least `ttl` old at `now`. Immutable
    /// entries never expire, and entries stamped in the future count as fresh.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.immutable {
            return false;
        }
        match now.signed_duration_since(self.timestamp).to_std() {
            Ok(age) => age >= ttl,
            Err(_) => false,
        }
    }
}

/// Decide whether `new` may replace `existing` under `key`.
fn accept_write(key: &str, existing: Option<&CacheEntry>, new: &CacheEntry) -> bool {
    match existing {
        Some(old) if old.immutable => {
            if !old.same_content(new) {
                tracing::warn!(
                    "Ignoring conflicting write to immutable cache entry {}: have {}, got {}",
                    key,
                    old.store_path,
                    new.store_path
                );
            }
            false
        }
        _ => true,
    }
}
