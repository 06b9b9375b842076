//! Shared services a fetch runs against.

use std::sync::Arc;

use chrono::Utc;

use crate::attrs::Attrs;
use crate::cache::{Cache, FileCache};
use crate::config::Settings;
use crate::download::{Downloader, HttpDownloader};
use crate::error::Result;
use crate::input::Input;
use crate::registry::InputSchemeRegistry;
use crate::store::{LocalStore, Store, StorePath};

/// Unified context for dependency injection.
///
/// Frontends build this once and hand it to every fetch. All services are
/// shared through `Arc`, so cloning a context is cheap.
#[derive(Clone)]
pub struct FetchContext {
    registry: Arc<InputSchemeRegistry>,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    downloader: Arc<dyn Downloader>,
    settings: Settings,
}

impl FetchContext {
    /// Create a context from explicit services and the default schemes.
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        downloader: Arc<dyn Downloader>,
        settings: Settings,
    ) -> Self {
        Self {
            registry: Arc::new(InputSchemeRegistry::with_default_schemes()),
            store,
            cache,
            downloader,
            settings,
        }
    }

    pub fn with_registry(mut self, registry: Arc<InputSchemeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Build the on-disk services described by `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let store_dir = settings.store_dir()?;
        let cache_dir = settings.cache_dir()?;

        let store = LocalStore::open(&store_dir)?;
        let cache = FileCache::open(cache_dir.join("fetcher-cache.json"))?;
        let downloader = HttpDownloader::new(&cache_dir)?;

        tracing::debug!(
            store = %store_dir.display(),
            cache = %cache_dir.display(),
            "opened fetch context"
        );

        Ok(Self::new(
            Arc::new(store),
            Arc::new(cache),
            Arc::new(downloader),
            settings,
        ))
    }

    pub fn registry(&self) -> &InputSchemeRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub fn downloader(&self) -> &dyn Downloader {
        self.downloader.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn input_from_url(&self, url: &str) -> Result<Input> {
        self.registry.input_from_url(url)
    }

    pub fn input_from_attrs(&self, attrs: &Attrs) -> Result<Input> {
        self.registry.input_from_attrs(attrs)
    }

    /// Cache lookup that treats mutable entries older than the tarball TTL
    /// and entries pointing at vanished store paths as misses.
    pub fn lookup_cache(&self, in_attrs: &Attrs) -> Result<Option<(Attrs, StorePath)>> {
        match self.cache.lookup_entry(in_attrs)? {
            Some(entry) if entry.is_expired(self.settings.tarball_ttl(), Utc::now()) => {
                tracing::debug!(
                    path = %entry.store_path,
                    written = %entry.timestamp,
                    "fetcher cache entry has expired"
                );
                Ok(None)
            }
            Some(entry) if self.store.is_valid_path(&entry.store_path) => {
                tracing::debug!(path = %entry.store_path, "fetcher cache hit");
                Ok(Some((entry.info_attrs, entry.store_path)))
            }
            Some(entry) => {
                tracing::debug!(path = %entry.store_path, "cached store path is no longer valid");
                Ok(None)
            }
            None => {
                tracing::debug!("fetcher cache miss");
                Ok(None)
            }
        }
    }

    pub fn add_to_cache(
        &self,
        in_attrs: &Attrs,
        info_attrs: &Attrs,
        store_path: &StorePath,
        immutable: bool,
    ) -> Result<()> {
        self.cache.add(in_attrs, info_attrs, store_path, immutable)
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("store_dir", &self.store.store_dir())
            .field("tarball_ttl", &self.settings.tarball_ttl)
            .finish_non_exhaustive()
    }
}
